// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Nodelet scheduling-resource accountant for TaskMesh.
//!
//! Tracks a worker node's declared capacities, what is currently free,
//! observed load, and the identity-preserving assignment of resource slots
//! to running tasks.

pub mod node_resource_manager;
pub mod resource_ids;
pub mod scheduling_resources;
