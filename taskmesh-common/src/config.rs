// Copyright 2025 The TaskMesh Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Nodelet configuration.
//!
//! A plain struct with defaults, overridable from a JSON string and from
//! `TASKMESH_<field>` environment variables.

use std::sync::OnceLock;

use crate::constants::DEFAULT_MEMORY_UNIT_MIB;
use crate::status::{Result, TaskMeshError};

/// Global NodeletConfig singleton.
static NODELET_CONFIG: OnceLock<NodeletConfig> = OnceLock::new();

/// Get the global NodeletConfig. Falls back to defaults if the process
/// never called [`initialize_config`].
pub fn nodelet_config() -> &'static NodeletConfig {
    NODELET_CONFIG.get_or_init(NodeletConfig::default)
}

/// Initialize the global NodeletConfig from a JSON string.
/// Returns an error if already initialized.
pub fn initialize_config(config_str: Option<&str>) -> Result<()> {
    let config = match config_str {
        Some(s) if !s.is_empty() => NodeletConfig::from_json(s)?,
        _ => NodeletConfig::default(),
    };
    NODELET_CONFIG
        .set(config)
        .map_err(|_| TaskMeshError::invalid("NodeletConfig already initialized"))
}

/// Nodelet configuration parameters.
#[derive(Debug, Clone)]
pub struct NodeletConfig {
    /// Block size (MiB) that one count of a memory-family resource
    /// represents. Affects only textual rendering of resource quantities.
    pub memory_unit_mib: u64,

    /// How often the nodelet reports its resource view to the control plane.
    pub report_resources_period_milliseconds: u64,

    /// Nodelet heartbeat period.
    pub heartbeat_period_milliseconds: u64,
}

impl Default for NodeletConfig {
    fn default() -> Self {
        Self {
            memory_unit_mib: DEFAULT_MEMORY_UNIT_MIB,
            report_resources_period_milliseconds: 100,
            heartbeat_period_milliseconds: 1_000,
        }
    }
}

impl NodeletConfig {
    /// Parse from a JSON object string; unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| TaskMeshError::invalid(format!("config JSON parse error: {e}")))?;

        let mut config = Self::default();

        macro_rules! set_field {
            ($field:ident) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v;
                }
            };
        }

        set_field!(memory_unit_mib);
        set_field!(report_resources_period_milliseconds);
        set_field!(heartbeat_period_milliseconds);

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides of the form `TASKMESH_<name>`.
    fn apply_env_overrides(&mut self) {
        macro_rules! env_override {
            ($field:ident) => {
                let env_key = concat!("TASKMESH_", stringify!($field));
                if let Ok(val) = std::env::var(env_key) {
                    if let Ok(v) = val.parse() {
                        self.$field = v;
                    }
                }
            };
        }

        env_override!(memory_unit_mib);
        env_override!(report_resources_period_milliseconds);
        env_override!(heartbeat_period_milliseconds);
    }
}
