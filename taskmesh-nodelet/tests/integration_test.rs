// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! End-to-end tests for the nodelet resource accountant: admission,
//! online reconfiguration with outstanding grants, and the wire export.

use std::collections::HashMap;

use rand::Rng;
use taskmesh_common::scheduling::{FixedPoint, ResourceSet};
use taskmesh_nodelet::node_resource_manager::NodeResourceManager;
use taskmesh_nodelet::resource_ids::ResourceIdSet;
use taskmesh_test_utils::{init_test_logging, random_whole_resource_set};

fn resource_set(entries: &[(&str, f64)]) -> ResourceSet {
    ResourceSet::from_map(
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect(),
    )
}

#[test]
fn test_online_resize_with_outstanding_grants_converges() {
    init_test_logging();
    let mgr = NodeResourceManager::new(
        "node1".to_string(),
        resource_set(&[("CPU", 4.0), ("GPU", 2.0)]),
    );

    let first = mgr
        .acquire_task_resources(&resource_set(&[("CPU", 2.0), ("GPU", 2.0)]))
        .unwrap();
    let second = mgr
        .acquire_task_resources(&resource_set(&[("CPU", 0.5)]))
        .unwrap();
    assert_eq!(
        mgr.available_resources(),
        resource_set(&[("CPU", 1.5)])
    );

    // The cluster shrinks the node to 3 CPUs while both grants are out.
    mgr.update_resource_capacity("CPU", 3);
    assert_eq!(mgr.total_resources().get("CPU"), FixedPoint::from_i64(3));
    assert_eq!(
        mgr.available_resources().get("CPU"),
        FixedPoint::from_f64(0.5)
    );

    mgr.release_task_resources(&first);
    assert_eq!(
        mgr.available_resources(),
        resource_set(&[("CPU", 2.5), ("GPU", 2.0)])
    );

    mgr.release_task_resources(&second);
    assert_eq!(mgr.available_resources(), mgr.total_resources());
    assert!(mgr.is_idle());
}

#[test]
fn test_deleted_resource_drops_returned_grants() {
    init_test_logging();
    let mgr = NodeResourceManager::new(
        "node1".to_string(),
        resource_set(&[("CPU", 2.0), ("GPU", 1.0)]),
    );

    let granted = mgr
        .acquire_task_resources(&resource_set(&[("CPU", 1.0), ("GPU", 1.0)]))
        .unwrap();
    mgr.delete_resource("GPU");
    mgr.release_task_resources(&granted);

    assert_eq!(mgr.available_resources(), resource_set(&[("CPU", 2.0)]));
    assert!(!mgr.total_resources().contains("GPU"));

    // A later reconfiguration can reintroduce the resource from scratch.
    mgr.update_resource_capacity("GPU", 2);
    assert!(mgr
        .acquire_task_resources(&resource_set(&[("GPU", 2.0)]))
        .is_some());
}

#[test]
fn test_grant_round_trips_through_the_wire() {
    init_test_logging();
    let mgr = NodeResourceManager::new(
        "node1".to_string(),
        resource_set(&[("CPU", 4.0), ("GPU", 2.0)]),
    );

    let granted = mgr
        .acquire_task_resources(&resource_set(&[("CPU", 0.5), ("GPU", 2.0)]))
        .unwrap();

    let bytes = granted.serialize();
    let restored = ResourceIdSet::deserialize(&bytes).unwrap();
    assert_eq!(restored.to_resource_set(), granted.to_resource_set());

    // Releasing the deserialized grant is as good as releasing the original.
    mgr.release_task_resources(&restored);
    assert_eq!(mgr.available_resources(), mgr.total_resources());
}

#[test]
fn test_randomized_acquire_release_conserves_resources() {
    init_test_logging();
    let mut rng = rand::thread_rng();

    for _ in 0..32 {
        let total = random_whole_resource_set(8);
        let mgr = NodeResourceManager::new("node1".to_string(), total.clone());

        let mut request_map = HashMap::new();
        for (name, quantity) in total.iter() {
            let cap = quantity.floor();
            let amount = if rng.gen_bool(0.3) {
                0.5
            } else {
                rng.gen_range(0..=cap) as f64
            };
            if amount > 0.0 {
                request_map.insert(name.to_string(), amount);
            }
        }
        if request_map.is_empty() {
            continue;
        }
        let request = ResourceSet::from_map(request_map);

        let granted = mgr.acquire_task_resources(&request).unwrap();
        assert_eq!(granted.to_resource_set(), request);

        mgr.release_task_resources(&granted);
        assert_eq!(mgr.available_resources(), mgr.total_resources());
        assert!(mgr.is_idle());
    }
}
