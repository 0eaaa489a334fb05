// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Constants shared across TaskMesh crates.

/// Precision of fractional resource quantities. One whole resource unit is
/// subdivided into this many parts, so the smallest representable request
/// is 1/10000 (e.g. `0.0001` CPU).
pub const RESOURCE_UNIT_SCALING: i32 = 10000;

/// Predefined resource names.
pub const CPU: &str = "CPU";
pub const GPU: &str = "GPU";
pub const MEM: &str = "memory";
pub const OBJECT_STORE_MEM: &str = "object_store_memory";

/// Default block size, in MiB, that one count of a memory-family resource
/// represents. Overridable via `NodeletConfig::memory_unit_mib`.
pub const DEFAULT_MEMORY_UNIT_MIB: u64 = 50;

/// TaskMesh version string.
pub const TASKMESH_VERSION: &str = "0.1.0";
