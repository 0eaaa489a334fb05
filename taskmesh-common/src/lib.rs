// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Common types for TaskMesh: constants, configuration, status/error types,
//! and scheduling quantities.

pub mod config;
pub mod constants;
pub mod scheduling;
pub mod status;
