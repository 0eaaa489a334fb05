// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared test helpers for TaskMesh crates.

use std::collections::HashMap;

use rand::Rng;
use taskmesh_common::scheduling::ResourceSet;

/// Initialize tracing for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// A random resource set with whole capacities, suitable for building slot
/// pools. Always contains at least one resource.
pub fn random_whole_resource_set(max_per_resource: i64) -> ResourceSet {
    let mut rng = rand::thread_rng();
    let mut map = HashMap::new();
    for name in ["CPU", "GPU", "memory", "object_store_memory"] {
        if rng.gen_bool(0.8) {
            map.insert(name.to_string(), rng.gen_range(1..=max_per_resource) as f64);
        }
    }
    if map.is_empty() {
        map.insert("CPU".to_string(), 1.0);
    }
    ResourceSet::from_map(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_whole_resource_set() {
        for _ in 0..16 {
            let set = random_whole_resource_set(4);
            assert!(!set.is_empty());
            for (_, quantity) in set.iter() {
                assert!(quantity.is_whole());
                assert!(quantity.is_positive());
            }
        }
    }
}
