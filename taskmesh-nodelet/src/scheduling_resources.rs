// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Aggregate resource accounting for a node.
//!
//! `SchedulingResources` holds the node's declared totals, what is
//! currently available, the observed load, and the normal-task usage view.
//! The scheduler acquires strictly (acquiring what was never there is a
//! bug) and releases clamped (the totals may have shrunk in flight).

use taskmesh_common::scheduling::{FixedPoint, ResourceSet};

/// The per-node record of total, available, and load resources.
#[derive(Debug, Clone, Default)]
pub struct SchedulingResources {
    resources_total: ResourceSet,
    resources_available: ResourceSet,
    resources_load: ResourceSet,
    resources_normal_tasks: ResourceSet,
}

impl SchedulingResources {
    /// Create with the given total capacities, all of them available.
    pub fn new(total: ResourceSet) -> Self {
        Self {
            resources_available: total.clone(),
            resources_total: total,
            resources_load: ResourceSet::new(),
            resources_normal_tasks: ResourceSet::new(),
        }
    }

    pub fn available_resources(&self) -> &ResourceSet {
        &self.resources_available
    }

    pub fn set_available_resources(&mut self, resources: ResourceSet) {
        self.resources_available = resources;
    }

    pub fn total_resources(&self) -> &ResourceSet {
        &self.resources_total
    }

    pub fn set_total_resources(&mut self, resources: ResourceSet) {
        self.resources_total = resources;
    }

    pub fn load_resources(&self) -> &ResourceSet {
        &self.resources_load
    }

    pub fn set_load_resources(&mut self, resources: ResourceSet) {
        self.resources_load = resources;
    }

    pub fn normal_task_resources(&self) -> &ResourceSet {
        &self.resources_normal_tasks
    }

    pub fn set_normal_task_resources(&mut self, resources: ResourceSet) {
        self.resources_normal_tasks = resources;
    }

    /// Take the requested resources out of the available set. Acquiring
    /// resources the node does not hold is fatal.
    pub fn acquire(&mut self, resources: &ResourceSet) {
        self.resources_available.subtract_strict(resources);
    }

    /// Return resources to the available set, capped at the current totals.
    /// Resources deleted in the meantime are dropped.
    pub fn release(&mut self, resources: &ResourceSet) {
        self.resources_available
            .add_capacity_constrained(resources, &self.resources_total);
    }

    /// Add capacity that did not exist at node startup (e.g. placement
    /// tokens) to both the total and available sets.
    pub fn add_resources(&mut self, resources: &ResourceSet) {
        self.resources_total.add(resources);
        self.resources_available.add(resources);
    }

    /// Set a resource's capacity, adjusting availability by the delta
    /// (clamped at zero). A capacity of 0 removes the resource from the
    /// total and available sets. The load set is never touched here.
    pub fn update_resource_capacity(&mut self, resource_name: &str, capacity: i64) {
        assert!(
            capacity >= 0,
            "resource capacity must be non-negative, got {capacity} for {resource_name}"
        );
        let new_capacity = FixedPoint::from_i64(capacity);
        let current_capacity = self.resources_total.get(resource_name);
        if current_capacity.is_positive() {
            let capacity_difference = new_capacity - current_capacity;
            let mut new_available =
                self.resources_available.get(resource_name) + capacity_difference;
            if new_available.is_negative() {
                new_available = FixedPoint::ZERO;
            }
            if new_capacity.is_zero() {
                self.resources_total.delete(resource_name);
            } else {
                self.resources_total.add_or_update(resource_name, new_capacity);
            }
            if new_available.is_zero() {
                self.resources_available.delete(resource_name);
            } else {
                self.resources_available
                    .add_or_update(resource_name, new_available);
            }
        } else {
            // New resource: it starts fully available.
            self.resources_total.add_or_update(resource_name, new_capacity);
            self.resources_available
                .add_or_update(resource_name, new_capacity);
        }
    }

    /// Remove a resource from the total, available, and load sets.
    pub fn delete_resource(&mut self, resource_name: &str) {
        self.resources_total.delete(resource_name);
        self.resources_available.delete(resource_name);
        self.resources_load.delete(resource_name);
    }

    /// Human-readable summary. The available line shows what is really
    /// free after subtracting normal-task usage.
    pub fn debug_string(&self) -> String {
        let mut resources_available = self.resources_available.clone();
        resources_available.subtract(&self.resources_normal_tasks);

        format!(
            "\n- total: {}\n- avail: {}\n- normal task usage: {}",
            self.resources_total, resources_available, self.resources_normal_tasks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_set(entries: &[(&str, f64)]) -> ResourceSet {
        ResourceSet::from_map(
            entries
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        )
    }

    #[test]
    fn test_acquire_and_release() {
        let total = resource_set(&[("CPU", 4.0), ("GPU", 2.0)]);
        let mut resources = SchedulingResources::new(total.clone());

        resources.acquire(&resource_set(&[("CPU", 2.0), ("GPU", 1.0)]));
        assert_eq!(
            *resources.available_resources(),
            resource_set(&[("CPU", 2.0), ("GPU", 1.0)])
        );

        resources.release(&resource_set(&[("CPU", 2.0), ("GPU", 1.0)]));
        assert_eq!(*resources.available_resources(), total);
    }

    #[test]
    #[should_panic(expected = "unknown resource")]
    fn test_acquire_unknown_resource_is_fatal() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.acquire(&resource_set(&[("TPU", 1.0)]));
    }

    #[test]
    fn test_release_is_capped_at_total() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 2.0)]));
        resources.acquire(&resource_set(&[("CPU", 1.0)]));

        // Over-return: available must not exceed total.
        resources.release(&resource_set(&[("CPU", 5.0)]));
        assert_eq!(*resources.available_resources(), resource_set(&[("CPU", 2.0)]));

        // Returning a deleted resource is dropped.
        resources.release(&resource_set(&[("GPU", 1.0)]));
        assert!(!resources.available_resources().contains("GPU"));
    }

    #[test]
    fn test_update_resource_capacity_existing() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.acquire(&resource_set(&[("CPU", 3.0)]));

        // Grow: the extra capacity becomes available.
        resources.update_resource_capacity("CPU", 6);
        assert_eq!(resources.total_resources().get("CPU"), FixedPoint::from_i64(6));
        assert_eq!(
            resources.available_resources().get("CPU"),
            FixedPoint::from_i64(3)
        );

        // Shrink below what is free: availability clamps at zero.
        resources.update_resource_capacity("CPU", 2);
        assert_eq!(resources.total_resources().get("CPU"), FixedPoint::from_i64(2));
        assert!(!resources.available_resources().contains("CPU"));
    }

    #[test]
    fn test_update_resource_capacity_new_resource() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.set_load_resources(resource_set(&[("CPU", 1.0)]));

        resources.update_resource_capacity("GPU", 2);
        assert_eq!(resources.total_resources().get("GPU"), FixedPoint::from_i64(2));
        assert_eq!(
            resources.available_resources().get("GPU"),
            FixedPoint::from_i64(2)
        );
        // Load is never touched by capacity updates.
        assert_eq!(*resources.load_resources(), resource_set(&[("CPU", 1.0)]));
    }

    #[test]
    fn test_update_resource_capacity_to_zero_removes() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.update_resource_capacity("CPU", 0);
        assert!(!resources.total_resources().contains("CPU"));
        assert!(!resources.available_resources().contains("CPU"));
    }

    #[test]
    fn test_delete_resource() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0), ("GPU", 1.0)]));
        resources.set_load_resources(resource_set(&[("GPU", 1.0)]));

        resources.delete_resource("GPU");
        assert!(!resources.total_resources().contains("GPU"));
        assert!(!resources.available_resources().contains("GPU"));
        assert!(resources.load_resources().is_empty());
    }

    #[test]
    fn test_add_resources_outer_joins_both_views() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.add_resources(&resource_set(&[("CPU", 1.0), ("bundle_group_1", 2.0)]));

        assert_eq!(resources.total_resources().get("CPU"), FixedPoint::from_i64(5));
        assert_eq!(
            resources.available_resources().get("bundle_group_1"),
            FixedPoint::from_i64(2)
        );
    }

    #[test]
    fn test_debug_string_subtracts_normal_task_usage() {
        let mut resources = SchedulingResources::new(resource_set(&[("CPU", 4.0)]));
        resources.set_normal_task_resources(resource_set(&[("CPU", 1.0)]));

        let debug = resources.debug_string();
        assert!(debug.contains("- total: {CPU: 4}"));
        assert!(debug.contains("- avail: {CPU: 3}"));
        assert!(debug.contains("- normal task usage: {CPU: 1}"));
    }
}
