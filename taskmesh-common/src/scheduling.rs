// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Scheduling quantities: `FixedPoint` arithmetic and `ResourceSet`.

use std::collections::HashMap;
use std::fmt;

use crate::config::nodelet_config;
use crate::constants::{CPU, MEM, OBJECT_STORE_MEM, RESOURCE_UNIT_SCALING};

/// Fixed-point representation for fractional resource quantities.
///
/// Resources in TaskMesh can be fractional (e.g., 0.5 CPU). FixedPoint
/// stores the value as `(value * RESOURCE_UNIT_SCALING)` internally so that
/// chains of adds and subtracts stay exact and "is this zero?" stays a
/// decidable question. Equality is exact; there are no epsilon comparisons.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint(i64);

impl FixedPoint {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(RESOURCE_UNIT_SCALING as i64);

    /// Create from a double value (rounded to the scaling factor).
    pub fn from_f64(value: f64) -> Self {
        Self((value * RESOURCE_UNIT_SCALING as f64).round() as i64)
    }

    /// Create from a whole number of units.
    pub fn from_i64(value: i64) -> Self {
        Self(value * RESOURCE_UNIT_SCALING as i64)
    }

    /// Create from the raw internal integer representation.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Convert to double value.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / RESOURCE_UNIT_SCALING as f64
    }

    /// Get the raw internal representation.
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Check if the value is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Check if the value is positive.
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Check if the value is negative.
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Check if the value is a whole number of units.
    pub fn is_whole(self) -> bool {
        self.0 % RESOURCE_UNIT_SCALING as i64 == 0
    }

    /// The largest whole number of units not exceeding the value.
    pub fn floor(self) -> i64 {
        self.0.div_euclid(RESOURCE_UNIT_SCALING as i64)
    }
}

impl std::ops::Add for FixedPoint {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for FixedPoint {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for FixedPoint {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for FixedPoint {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Neg for FixedPoint {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedPoint({})", self.to_f64())
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// A sparse set of named resources with fixed-point quantities.
///
/// Every stored value is strictly positive: operations that would drop a
/// value to zero or below remove the key instead. Two sets are equal iff
/// each is a subset of the other, which under the positivity invariant
/// treats a missing key and a zero quantity identically.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    resources: HashMap<String, FixedPoint>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a map of resource name → double value.
    /// Declaring a non-positive capacity is a caller error and is fatal.
    pub fn from_map(map: HashMap<String, f64>) -> Self {
        let mut resources = HashMap::with_capacity(map.len());
        for (name, value) in map {
            assert!(
                value > 0.0,
                "resource {name} declared with non-positive capacity {value}"
            );
            resources.insert(name, FixedPoint::from_f64(value));
        }
        Self { resources }
    }

    /// Get the quantity of a resource (zero if absent).
    pub fn get(&self, resource: &str) -> FixedPoint {
        self.resources
            .get(resource)
            .copied()
            .unwrap_or(FixedPoint::ZERO)
    }

    /// Check if a resource is present.
    pub fn contains(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    /// Replace a resource's capacity. A non-positive capacity is a no-op.
    pub fn add_or_update(&mut self, resource: &str, capacity: FixedPoint) {
        if capacity.is_positive() {
            self.resources.insert(resource.to_string(), capacity);
        }
    }

    /// Remove a resource. Returns whether it was present.
    pub fn delete(&mut self, resource: &str) -> bool {
        self.resources.remove(resource).is_some()
    }

    /// Subtract another set, clamping at zero. Entries that reach zero or
    /// below are removed; keys absent from `self` are ignored.
    pub fn subtract(&mut self, other: &ResourceSet) {
        for (name, amount) in &other.resources {
            if let Some(entry) = self.resources.get_mut(name) {
                *entry -= *amount;
                if !entry.is_positive() {
                    self.resources.remove(name);
                }
            }
        }
    }

    /// Subtract another set, requiring every subtracted key to be present
    /// with at least the subtracted quantity. Violations are fatal. Entries
    /// that reach exactly zero are removed.
    pub fn subtract_strict(&mut self, other: &ResourceSet) {
        for (name, amount) in &other.resources {
            let entry = self
                .resources
                .get_mut(name)
                .unwrap_or_else(|| panic!("attempt to acquire unknown resource {name}"));
            *entry -= *amount;
            assert!(
                !entry.is_negative(),
                "capacity of resource {name} after subtraction is negative: {entry}"
            );
            if entry.is_zero() {
                self.resources.remove(name);
            }
        }
    }

    /// Add another set (outer join): keys absent from `self` are created.
    pub fn add(&mut self, other: &ResourceSet) {
        for (name, amount) in &other.resources {
            let entry = self
                .resources
                .entry(name.clone())
                .or_insert(FixedPoint::ZERO);
            *entry += *amount;
        }
    }

    /// Add another set, capping each key at its capacity in `total`. Keys
    /// absent from `total` no longer exist on this node and are skipped.
    pub fn add_capacity_constrained(&mut self, other: &ResourceSet, total: &ResourceSet) {
        for (name, amount) in &other.resources {
            if let Some(cap) = total.resources.get(name) {
                let entry = self
                    .resources
                    .entry(name.clone())
                    .or_insert(FixedPoint::ZERO);
                *entry = (*entry + *amount).min(*cap);
            } else {
                tracing::debug!(
                    resource = %name,
                    "resource not in the total map, likely deleted; not adding back"
                );
            }
        }
    }

    /// Project to a set containing only the CPU resource, if present.
    pub fn cpu_resources(&self) -> ResourceSet {
        let mut cpu_set = ResourceSet::new();
        let quantity = self.get(CPU);
        if quantity.is_positive() {
            cpu_set.resources.insert(CPU.to_string(), quantity);
        }
        cpu_set
    }

    /// Check if this set is contained in `other` (missing keys count as 0).
    pub fn is_subset_of(&self, other: &ResourceSet) -> bool {
        self.resources
            .iter()
            .all(|(name, amount)| *amount <= other.get(name))
    }

    /// Check if this set has at least the resources in `other`.
    pub fn is_superset_of(&self, other: &ResourceSet) -> bool {
        other.is_subset_of(self)
    }

    /// Check if the resource set is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of distinct resource types.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Iterate over (name, quantity) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FixedPoint)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Convert to a map of resource name → double.
    pub fn to_map(&self) -> HashMap<String, f64> {
        self.resources
            .iter()
            .map(|(k, v)| (k.clone(), v.to_f64()))
            .collect()
    }
}

impl PartialEq for ResourceSet {
    fn eq(&self, other: &Self) -> bool {
        self.is_subset_of(other) && other.is_subset_of(self)
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.resources.is_empty() {
            return write!(f, "{{}}");
        }
        let mut first = true;
        for (name, quantity) in &self.resources {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{{{}: {}}}", name, format_resource(name, quantity.to_f64()))?;
        }
        Ok(())
    }
}

/// Render a resource quantity for human consumption. Memory-family
/// resources are counted in fixed-size blocks and rendered in GiB.
pub fn format_resource(resource_name: &str, quantity: f64) -> String {
    if resource_name == OBJECT_STORE_MEM || resource_name.starts_with(MEM) {
        let unit_mib = nodelet_config().memory_unit_mib as f64;
        return format!("{} GiB", quantity * unit_mib / 1024.0);
    }
    format!("{quantity}")
}
