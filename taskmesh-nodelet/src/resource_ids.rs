// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Identity-preserving slot accounting.
//!
//! A resource like `GPU` is modeled as a pool of whole slot ids plus
//! per-id fractional residuals, so the scheduler can pin a task to specific
//! hardware. `ResourceIds` is one such pool; `ResourceIdSet` maps resource
//! names to pools and owns the neutral wire export.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use taskmesh_common::constants::CPU;
use taskmesh_common::scheduling::{FixedPoint, ResourceSet};
use taskmesh_common::status::{Result, TaskMeshError};

/// Identity of one whole unit of a resource.
///
/// `Physical` slots come from the node's hardware enumeration (e.g. a GPU
/// index). Capacity added at runtime has no stable identity; such slots are
/// `Dynamic` and fungible. On the wire and in text, `Dynamic` appears as
/// `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Physical(i64),
    Dynamic,
}

impl SlotId {
    /// Decode from the wire encoding: negative values mean dynamic.
    pub fn from_i64(raw: i64) -> Self {
        if raw < 0 {
            SlotId::Dynamic
        } else {
            SlotId::Physical(raw)
        }
    }

    /// The wire encoding of this id.
    pub fn to_i64(self) -> i64 {
        match self {
            SlotId::Physical(id) => id,
            SlotId::Dynamic => -1,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_i64())
    }
}

/// The slot pool for a single resource.
///
/// `total_capacity` is the declared capacity; it may exceed the free
/// quantity while grants are outstanding, and the pool may owe slots to a
/// pending shrink (`decrement_backlog`), paid off as releases arrive.
#[derive(Debug, Clone, Default)]
pub struct ResourceIds {
    /// Slot ids currently free as whole units. Acquisition pops the tail.
    whole_ids: Vec<SlotId>,
    /// Partially allocated slots with their remaining fraction in (0, 1).
    fractional_ids: Vec<(SlotId, FixedPoint)>,
    total_capacity: FixedPoint,
    decrement_backlog: i64,
}

impl ResourceIds {
    /// Create a pool of `capacity` whole slots with ids `0..capacity`.
    /// The capacity must be a whole, non-negative quantity.
    pub fn new(capacity: FixedPoint) -> Self {
        assert!(
            capacity.is_whole() && !capacity.is_negative(),
            "declared slot capacity must be a whole non-negative quantity, got {capacity}"
        );
        let whole_ids = (0..capacity.floor()).map(SlotId::Physical).collect();
        Self {
            whole_ids,
            fractional_ids: Vec::new(),
            total_capacity: capacity,
            decrement_backlog: 0,
        }
    }

    /// Create a pool holding exactly the given whole slots.
    pub fn from_whole_ids(whole_ids: Vec<SlotId>) -> Self {
        let total_capacity = FixedPoint::from_i64(whole_ids.len() as i64);
        Self {
            whole_ids,
            fractional_ids: Vec::new(),
            total_capacity,
            decrement_backlog: 0,
        }
    }

    /// Create a pool holding exactly the given fractional slots.
    pub fn from_fractional_ids(fractional_ids: Vec<(SlotId, FixedPoint)>) -> Self {
        Self::from_parts(Vec::new(), fractional_ids)
    }

    /// Create a pool holding the given whole and fractional slots.
    pub fn from_parts(
        whole_ids: Vec<SlotId>,
        fractional_ids: Vec<(SlotId, FixedPoint)>,
    ) -> Self {
        let mut pool = Self {
            whole_ids,
            fractional_ids,
            total_capacity: FixedPoint::ZERO,
            decrement_backlog: 0,
        };
        pool.total_capacity = pool.total_quantity();
        pool
    }

    /// Check whether `quantity` can currently be acquired.
    ///
    /// A quantity of one or more must be a whole number (fatal otherwise)
    /// and requires that many free whole slots. A sub-unit quantity is
    /// satisfiable by any whole slot or by any single residual of at least
    /// that size.
    pub fn contains(&self, quantity: FixedPoint) -> bool {
        if quantity >= FixedPoint::ONE {
            assert!(
                quantity.is_whole(),
                "quantities of one or more must be whole, got {quantity}"
            );
            self.whole_ids.len() as i64 >= quantity.floor()
        } else if !self.whole_ids.is_empty() {
            true
        } else {
            self.fractional_ids.iter().any(|(_, frac)| *frac >= quantity)
        }
    }

    /// Take `quantity` out of the pool, returning the granted slots.
    ///
    /// Whole quantities pop ids from the tail of the free list. Sub-unit
    /// quantities debit the first residual large enough; if none fits, a
    /// whole slot is split and its remainder joins the residuals.
    /// Acquiring more than [`Self::contains`] permits is fatal; callers
    /// gate acquisitions on it.
    pub fn acquire(&mut self, quantity: FixedPoint) -> ResourceIds {
        if quantity >= FixedPoint::ONE {
            assert!(
                quantity.is_whole(),
                "quantities of one or more must be whole, got {quantity}"
            );
            let count = quantity.floor() as usize;
            assert!(
                self.whole_ids.len() >= count,
                "acquire of {count} whole slots with only {} free",
                self.whole_ids.len()
            );
            let granted = self.whole_ids.split_off(self.whole_ids.len() - count);
            return ResourceIds::from_whole_ids(granted);
        }

        for index in 0..self.fractional_ids.len() {
            if self.fractional_ids[index].1 >= quantity {
                let id = self.fractional_ids[index].0;
                self.fractional_ids[index].1 -= quantity;
                if self.fractional_ids[index].1.is_zero() {
                    self.fractional_ids.swap_remove(index);
                }
                return ResourceIds::from_fractional_ids(vec![(id, quantity)]);
            }
        }

        // No residual is large enough; split a whole slot.
        let id = self
            .whole_ids
            .pop()
            .expect("acquire of a fractional quantity from an exhausted pool");
        self.fractional_ids.push((id, FixedPoint::ONE - quantity));
        ResourceIds::from_fractional_ids(vec![(id, quantity)])
    }

    /// Return previously granted slots to the pool.
    ///
    /// Whole slots pay off the decrement backlog first; only the remainder
    /// rejoins the free list. Fractional returns merge into the matching
    /// residual (a merged residual above one whole unit is fatal); a
    /// residual reaching exactly one restores the slot as whole, again
    /// paying the backlog first.
    pub fn release(&mut self, resource_ids: &ResourceIds) {
        let returned = resource_ids.whole_ids();
        let count = returned.len() as i64;
        if count > self.decrement_backlog {
            self.whole_ids
                .extend_from_slice(&returned[self.decrement_backlog as usize..]);
            self.decrement_backlog = 0;
        } else {
            self.decrement_backlog -= count;
        }

        for &(id, fraction) in resource_ids.fractional_ids() {
            match self.fractional_ids.iter().position(|(held, _)| *held == id) {
                None => self.fractional_ids.push((id, fraction)),
                Some(index) => {
                    let merged = self.fractional_ids[index].1 + fraction;
                    assert!(
                        merged <= FixedPoint::ONE,
                        "residual of slot {id} is {merged} after release; must not exceed one"
                    );
                    if merged == FixedPoint::ONE {
                        self.fractional_ids.remove(index);
                        if self.decrement_backlog > 0 {
                            self.decrement_backlog -= 1;
                        } else {
                            self.whole_ids.push(id);
                        }
                    } else {
                        self.fractional_ids[index].1 = merged;
                    }
                }
            }
        }
    }

    /// The union of this pool and `resource_ids`, leaving `self` untouched.
    pub fn plus(&self, resource_ids: &ResourceIds) -> ResourceIds {
        let mut result = ResourceIds::from_parts(self.whole_ids.clone(), self.fractional_ids.clone());
        result.release(resource_ids);
        result
    }

    /// Adjust the declared capacity to `new_capacity` whole units.
    ///
    /// Increases cancel any decrement backlog before adding `Dynamic`
    /// slots. Decreases discard free whole slots immediately and record the
    /// shortfall in the backlog; `total_capacity` falls unconditionally.
    pub fn update_capacity(&mut self, new_capacity: i64) {
        assert!(
            new_capacity >= 0,
            "resource capacity must be non-negative, got {new_capacity}"
        );
        assert!(
            self.total_capacity.is_whole(),
            "capacity updates require a whole total capacity, have {}",
            self.total_capacity
        );
        let delta = new_capacity - self.total_capacity.floor();
        if delta < 0 {
            self.decrease_capacity(-delta);
        } else {
            self.increase_capacity(delta);
        }
    }

    fn increase_capacity(&mut self, increment: i64) {
        let actual = (increment - self.decrement_backlog).max(0);
        self.decrement_backlog = (self.decrement_backlog - increment).max(0);
        if actual > 0 {
            self.whole_ids
                .extend(std::iter::repeat(SlotId::Dynamic).take(actual as usize));
            self.total_capacity += FixedPoint::from_i64(actual);
        }
    }

    fn decrease_capacity(&mut self, decrement: i64) {
        // Fractional pieces do not count toward a whole-unit shrink.
        let available = self.total_quantity().floor();
        tracing::debug!(available, decrement, "decreasing pool capacity");
        let discard = available.min(decrement);
        if available < decrement {
            self.decrement_backlog += decrement - available;
        }
        if discard > 0 {
            self.acquire(FixedPoint::from_i64(discard));
        }
        self.total_capacity -= FixedPoint::from_i64(decrement);
    }

    /// Slot ids currently free as whole units.
    pub fn whole_ids(&self) -> &[SlotId] {
        &self.whole_ids
    }

    /// Partially allocated slots with their remaining fractions.
    pub fn fractional_ids(&self) -> &[(SlotId, FixedPoint)] {
        &self.fractional_ids
    }

    /// True when no whole or fractional slots remain.
    pub fn is_empty(&self) -> bool {
        self.whole_ids.is_empty() && self.fractional_ids.is_empty()
    }

    /// The quantity currently free: whole slots plus residuals.
    pub fn total_quantity(&self) -> FixedPoint {
        let mut total = FixedPoint::from_i64(self.whole_ids.len() as i64);
        for (_, fraction) in &self.fractional_ids {
            total += *fraction;
        }
        total
    }

    /// The declared capacity.
    pub fn total_capacity(&self) -> FixedPoint {
        self.total_capacity
    }

    /// Whole units still owed to a pending shrink.
    pub fn decrement_backlog(&self) -> i64 {
        self.decrement_backlog
    }
}

impl fmt::Display for ResourceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Whole IDs: [")?;
        for (i, id) in self.whole_ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "], Fractional IDs: [")?;
        for (i, (id, fraction)) in self.fractional_ids.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({id}, {fraction})")?;
        }
        write!(f, "]")
    }
}

/// Wire record for one resource pool: parallel id/fraction vectors.
/// Whole slots carry fraction `1.0`; partial slots carry their remaining
/// fraction in (0, 1). Dynamic slots encode their id as `-1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceIdSetInfo {
    pub resource_name: String,
    pub resource_ids: Vec<i64>,
    pub resource_fractions: Vec<f64>,
}

/// Per-resource slot pools for a node.
#[derive(Debug, Clone, Default)]
pub struct ResourceIdSet {
    available_resources: HashMap<String, ResourceIds>,
}

impl ResourceIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build pools from declared capacities. Each capacity must be a whole
    /// quantity; slot ids are assigned `0..capacity` per resource.
    pub fn from_resource_set(resource_set: &ResourceSet) -> Self {
        let available_resources = resource_set
            .iter()
            .map(|(name, quantity)| (name.to_string(), ResourceIds::new(quantity)))
            .collect();
        Self {
            available_resources,
        }
    }

    /// Check whether every requested quantity is currently acquirable.
    pub fn contains(&self, resource_set: &ResourceSet) -> bool {
        resource_set.iter().all(|(name, quantity)| {
            self.available_resources
                .get(name)
                .is_some_and(|ids| ids.contains(quantity))
        })
    }

    /// Acquire every requested quantity, returning the granted slots.
    /// Requesting an untracked resource is fatal; callers gate on
    /// [`Self::contains`]. A pool emptied by the acquire is removed.
    pub fn acquire(&mut self, resource_set: &ResourceSet) -> ResourceIdSet {
        let mut acquired = HashMap::new();
        for (name, quantity) in resource_set.iter() {
            let ids = self
                .available_resources
                .get_mut(name)
                .unwrap_or_else(|| panic!("acquire of untracked resource {name}"));
            acquired.insert(name.to_string(), ids.acquire(quantity));
            if ids.is_empty() {
                self.available_resources.remove(name);
            }
        }
        ResourceIdSet {
            available_resources: acquired,
        }
    }

    /// Return granted slots to their pools, creating pools as needed.
    pub fn release(&mut self, resource_id_set: &ResourceIdSet) {
        for (name, ids) in &resource_id_set.available_resources {
            assert!(!ids.is_empty(), "release of an empty pool for resource {name}");
            match self.available_resources.get_mut(name) {
                Some(existing) => existing.release(ids),
                None => {
                    self.available_resources.insert(name.clone(), ids.clone());
                }
            }
        }
    }

    /// Like [`Self::release`], but slots of resources no longer present in
    /// `resources_total` are dropped: the resource was deleted while the
    /// grant was outstanding.
    pub fn release_constrained(
        &mut self,
        resource_id_set: &ResourceIdSet,
        resources_total: &ResourceSet,
    ) {
        for (name, ids) in &resource_id_set.available_resources {
            if resources_total.get(name).is_zero() {
                tracing::debug!(
                    resource = %name,
                    "dropping released slots of a deleted resource"
                );
                continue;
            }
            assert!(!ids.is_empty(), "release of an empty pool for resource {name}");
            match self.available_resources.get_mut(name) {
                Some(existing) => existing.release(ids),
                None => {
                    self.available_resources.insert(name.clone(), ids.clone());
                }
            }
        }
    }

    /// Remove all pools.
    pub fn clear(&mut self) {
        self.available_resources.clear();
    }

    /// The union of this set and `resource_id_set`, leaving `self`
    /// untouched.
    pub fn plus(&self, resource_id_set: &ResourceIdSet) -> ResourceIdSet {
        let mut result = self.clone();
        result.release(resource_id_set);
        result
    }

    /// Create a pool with the given capacity, or resize an existing one.
    pub fn add_or_update_resource(&mut self, resource_name: &str, capacity: i64) {
        match self.available_resources.get_mut(resource_name) {
            Some(ids) => ids.update_capacity(capacity),
            None => {
                self.available_resources.insert(
                    resource_name.to_string(),
                    ResourceIds::new(FixedPoint::from_i64(capacity)),
                );
            }
        }
    }

    /// Drop a resource's pool entirely.
    pub fn delete_resource(&mut self, resource_name: &str) {
        self.available_resources.remove(resource_name);
    }

    /// The per-resource pools.
    pub fn available_resources(&self) -> &HashMap<String, ResourceIds> {
        &self.available_resources
    }

    /// A set holding only the CPU pool, if present.
    pub fn cpu_resources(&self) -> ResourceIdSet {
        let mut cpu_resources = HashMap::new();
        if let Some(ids) = self.available_resources.get(CPU) {
            cpu_resources.insert(CPU.to_string(), ids.clone());
        }
        ResourceIdSet {
            available_resources: cpu_resources,
        }
    }

    /// Project to aggregate quantities, dropping slot identities.
    pub fn to_resource_set(&self) -> ResourceSet {
        let mut resource_set = ResourceSet::new();
        for (name, ids) in &self.available_resources {
            resource_set.add_or_update(name, ids.total_quantity());
        }
        resource_set
    }

    /// The neutral export: one record per resource, sorted by name so a
    /// given state always yields the same byte stream.
    pub fn to_infos(&self) -> Vec<ResourceIdSetInfo> {
        let mut infos: Vec<ResourceIdSetInfo> = self
            .available_resources
            .iter()
            .map(|(name, ids)| {
                let mut resource_ids = Vec::new();
                let mut resource_fractions = Vec::new();
                for id in ids.whole_ids() {
                    resource_ids.push(id.to_i64());
                    resource_fractions.push(1.0);
                }
                for (id, fraction) in ids.fractional_ids() {
                    resource_ids.push(id.to_i64());
                    resource_fractions.push(fraction.to_f64());
                }
                ResourceIdSetInfo {
                    resource_name: name.clone(),
                    resource_ids,
                    resource_fractions,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.resource_name.cmp(&b.resource_name));
        infos
    }

    /// Rebuild a set from exported records. Record order is irrelevant.
    pub fn from_infos(infos: Vec<ResourceIdSetInfo>) -> Result<ResourceIdSet> {
        let mut available_resources = HashMap::new();
        for info in infos {
            if info.resource_ids.len() != info.resource_fractions.len() {
                return Err(TaskMeshError::invalid(format!(
                    "resource {}: {} ids but {} fractions",
                    info.resource_name,
                    info.resource_ids.len(),
                    info.resource_fractions.len()
                )));
            }
            if available_resources.contains_key(&info.resource_name) {
                return Err(TaskMeshError::invalid(format!(
                    "duplicate record for resource {}",
                    info.resource_name
                )));
            }
            let mut whole_ids = Vec::new();
            let mut fractional_ids = Vec::new();
            for (&raw_id, &fraction) in info.resource_ids.iter().zip(&info.resource_fractions) {
                let id = SlotId::from_i64(raw_id);
                if fraction == 1.0 {
                    whole_ids.push(id);
                } else {
                    let converted = FixedPoint::from_f64(fraction);
                    if !converted.is_positive() || converted >= FixedPoint::ONE {
                        return Err(TaskMeshError::invalid(format!(
                            "resource {}: slot {raw_id} carries fraction {fraction} outside (0, 1]",
                            info.resource_name
                        )));
                    }
                    fractional_ids.push((id, converted));
                }
            }
            if whole_ids.is_empty() && fractional_ids.is_empty() {
                continue;
            }
            available_resources.insert(
                info.resource_name,
                ResourceIds::from_parts(whole_ids, fractional_ids),
            );
        }
        Ok(ResourceIdSet {
            available_resources,
        })
    }

    /// Serialize to the deterministic neutral byte stream.
    pub fn serialize(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_infos()).expect("resource id records always serialize")
    }

    /// Parse a byte stream produced by [`Self::serialize`] (or any
    /// correctly-formed equivalent, in any record order).
    pub fn deserialize(bytes: &[u8]) -> Result<ResourceIdSet> {
        let infos: Vec<ResourceIdSetInfo> = serde_json::from_slice(bytes)
            .map_err(|e| TaskMeshError::invalid(format!("malformed resource id payload: {e}")))?;
        Self::from_infos(infos)
    }
}

impl fmt::Display for ResourceIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AvailableResources: ")?;
        let mut first = true;
        for (name, ids) in &self.available_resources {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}: {{{ids}}}")?;
        }
        Ok(())
    }
}
