// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Node resource manager: the owner of this node's resource accounting.
//!
//! Couples the aggregate view (`SchedulingResources`) with the
//! identity-preserving view (`ResourceIdSet`) behind a single lock, so the
//! scheduler loop mutates both consistently. All public operations keep
//! the two views in step.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use taskmesh_common::scheduling::ResourceSet;

use crate::resource_ids::ResourceIdSet;
use crate::scheduling_resources::SchedulingResources;

struct NodeState {
    scheduling: SchedulingResources,
    local_ids: ResourceIdSet,
}

/// Tracks this node's resources at both aggregate and slot granularity.
pub struct NodeResourceManager {
    /// The local node ID (hex string).
    node_id: String,
    state: RwLock<NodeState>,
    /// Monotonic version counter (incremented on any state change).
    version: AtomicI64,
}

impl NodeResourceManager {
    /// Create with the node's declared capacities. Slot pools require
    /// whole declared quantities.
    pub fn new(node_id: String, total: ResourceSet) -> Self {
        let local_ids = ResourceIdSet::from_resource_set(&total);
        Self {
            node_id,
            state: RwLock::new(NodeState {
                scheduling: SchedulingResources::new(total),
                local_ids,
            }),
            version: AtomicI64::new(0),
        }
    }

    /// Admit a task: take the requested resources out of both views.
    /// Returns the granted slots, or `None` if the request does not fit.
    pub fn acquire_task_resources(&self, request: &ResourceSet) -> Option<ResourceIdSet> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if !state.local_ids.contains(request)
            || !state.scheduling.available_resources().is_superset_of(request)
        {
            return None;
        }
        let granted = state.local_ids.acquire(request);
        state.scheduling.acquire(request);
        self.bump_version();
        Some(granted)
    }

    /// Return a finished task's slots to both views. Resources deleted
    /// while the grant was outstanding are dropped.
    pub fn release_task_resources(&self, granted: &ResourceIdSet) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let returned = granted.to_resource_set();
        let total = state.scheduling.total_resources().clone();
        state.local_ids.release_constrained(granted, &total);
        state.scheduling.release(&returned);
        self.bump_version();
    }

    /// Reconfigure a resource's capacity online in both views.
    pub fn update_resource_capacity(&self, resource_name: &str, capacity: i64) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.local_ids.add_or_update_resource(resource_name, capacity);
        state.scheduling.update_resource_capacity(resource_name, capacity);
        self.bump_version();
    }

    /// Remove a resource from both views.
    pub fn delete_resource(&self, resource_name: &str) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.local_ids.delete_resource(resource_name);
        state.scheduling.delete_resource(resource_name);
        self.bump_version();
    }

    /// The currently available resources, as an aggregate snapshot.
    pub fn available_resources(&self) -> ResourceSet {
        self.state.read().scheduling.available_resources().clone()
    }

    /// The declared totals, as an aggregate snapshot.
    pub fn total_resources(&self) -> ResourceSet {
        self.state.read().scheduling.total_resources().clone()
    }

    /// The observed load signal.
    pub fn load_resources(&self) -> ResourceSet {
        self.state.read().scheduling.load_resources().clone()
    }

    /// Set the observed load signal.
    pub fn set_load_resources(&self, load: ResourceSet) {
        self.state.write().scheduling.set_load_resources(load);
        self.bump_version();
    }

    /// Set the normal-task usage view.
    pub fn set_normal_task_resources(&self, resources: ResourceSet) {
        self.state
            .write()
            .scheduling
            .set_normal_task_resources(resources);
        self.bump_version();
    }

    /// The normal-task usage view.
    pub fn normal_task_resources(&self) -> ResourceSet {
        self.state.read().scheduling.normal_task_resources().clone()
    }

    /// Check if the request currently fits on this node.
    pub fn is_available(&self, request: &ResourceSet) -> bool {
        self.state.read().local_ids.contains(request)
    }

    /// Check if the node could ever satisfy the request.
    pub fn is_feasible(&self, request: &ResourceSet) -> bool {
        self.state
            .read()
            .scheduling
            .total_resources()
            .is_superset_of(request)
    }

    /// Check if the node is idle (nothing acquired).
    pub fn is_idle(&self) -> bool {
        let state = self.state.read();
        state
            .scheduling
            .available_resources()
            .is_superset_of(state.scheduling.total_resources())
    }

    /// Human-readable summary of both views.
    pub fn debug_string(&self) -> String {
        let state = self.state.read();
        format!(
            "{}\n- local slots: {}",
            state.scheduling.debug_string(),
            state.local_ids
        )
    }

    /// The current version counter.
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    /// The local node ID.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
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

    fn make_manager() -> NodeResourceManager {
        NodeResourceManager::new(
            "node1".to_string(),
            resource_set(&[("CPU", 4.0), ("GPU", 2.0), ("memory", 8192.0)]),
        )
    }

    #[test]
    fn test_acquire_and_release() {
        let mgr = make_manager();

        let request = resource_set(&[("CPU", 2.0), ("GPU", 1.0)]);
        let granted = mgr.acquire_task_resources(&request).unwrap();
        assert_eq!(granted.to_resource_set(), request);
        assert!(!mgr.is_idle());
        assert_eq!(
            mgr.available_resources(),
            resource_set(&[("CPU", 2.0), ("GPU", 1.0), ("memory", 8192.0)])
        );

        mgr.release_task_resources(&granted);
        assert!(mgr.is_idle());
        assert_eq!(mgr.available_resources(), mgr.total_resources());
    }

    #[test]
    fn test_acquire_insufficient_returns_none() {
        let mgr = make_manager();
        assert!(mgr
            .acquire_task_resources(&resource_set(&[("CPU", 5.0)]))
            .is_none());
        assert!(mgr
            .acquire_task_resources(&resource_set(&[("TPU", 1.0)]))
            .is_none());
        assert!(mgr.is_idle());
    }

    #[test]
    fn test_feasibility() {
        let mgr = make_manager();
        assert!(mgr.is_feasible(&resource_set(&[("CPU", 4.0)])));
        assert!(!mgr.is_feasible(&resource_set(&[("CPU", 5.0)])));

        let granted = mgr
            .acquire_task_resources(&resource_set(&[("CPU", 4.0)]))
            .unwrap();
        assert!(!mgr.is_available(&resource_set(&[("CPU", 1.0)])));
        assert!(mgr.is_feasible(&resource_set(&[("CPU", 4.0)])));
        mgr.release_task_resources(&granted);
    }

    #[test]
    fn test_capacity_update_with_outstanding_grant() {
        let mgr = make_manager();
        let granted = mgr
            .acquire_task_resources(&resource_set(&[("GPU", 2.0)]))
            .unwrap();

        // Shrink while both slots are held: nothing is free to discard.
        mgr.update_resource_capacity("GPU", 0);
        assert!(!mgr.total_resources().contains("GPU"));
        assert!(!mgr.available_resources().contains("GPU"));

        // The returned slots are absorbed, not resurrected.
        mgr.release_task_resources(&granted);
        assert!(!mgr.available_resources().contains("GPU"));
    }

    #[test]
    fn test_delete_resource_with_outstanding_grant() {
        let mgr = make_manager();
        let granted = mgr
            .acquire_task_resources(&resource_set(&[("GPU", 1.0), ("CPU", 1.0)]))
            .unwrap();

        mgr.delete_resource("GPU");
        mgr.release_task_resources(&granted);

        // CPU came back; GPU stayed gone.
        assert_eq!(mgr.available_resources().get("CPU"), mgr.total_resources().get("CPU"));
        assert!(!mgr.available_resources().contains("GPU"));
    }

    #[test]
    fn test_load_is_independent() {
        let mgr = make_manager();
        mgr.set_load_resources(resource_set(&[("CPU", 7.0)]));

        let granted = mgr
            .acquire_task_resources(&resource_set(&[("CPU", 1.0)]))
            .unwrap();
        assert_eq!(mgr.load_resources(), resource_set(&[("CPU", 7.0)]));
        mgr.release_task_resources(&granted);
        assert_eq!(mgr.load_resources(), resource_set(&[("CPU", 7.0)]));
    }

    #[test]
    fn test_version_increments() {
        let mgr = make_manager();
        let v0 = mgr.version();

        let granted = mgr
            .acquire_task_resources(&resource_set(&[("CPU", 1.0)]))
            .unwrap();
        assert!(mgr.version() > v0);

        let v1 = mgr.version();
        mgr.release_task_resources(&granted);
        assert!(mgr.version() > v1);
    }

    #[test]
    fn test_debug_string_mentions_both_views() {
        let mgr = make_manager();
        let debug = mgr.debug_string();
        assert!(debug.contains("- total:"));
        assert!(debug.contains("- local slots:"));
    }
}
