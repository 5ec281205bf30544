// Copyright 2026 the Sandbox Host Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON runner configuration.
//!
//! ```json
//! {
//!   "slots": [{ "location": ".ram.0", "path": "app.bin" }],
//!   "limits": { "stack_size": 512, "branch_budget": 100, "no_return": false },
//!   "groups": ["core", "device", "timer"],
//!   "devices": [{ "name": "temp", "class": 130, "value": [215, 0, 0], "scale": -1, "dims": 1 }],
//!   "response": { "message_id": 7, "token": [1, 2] }
//! }
//! ```
//!
//! Relative slot paths are resolved against the directory holding the configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use sandbox_host::harness::{DEFAULT_BRANCH_BUDGET, ExecFlags, MIN_STACK_SIZE};
use sandbox_host::registry::{CallGroup, CallRegistry};
use sandbox_host::sandbox::SandboxConfig;
use sandbox_host::services::{Phydat, ResponseState, StaticDevice, StaticDevices};
use sandbox_host::store::{DEFAULT_IMAGE_CAPACITY, RamStore};
use serde::Deserialize;

/// Top-level runner configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RunnerConfig {
    /// Images to install in the RAM store.
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
    /// Harness limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Enabled call groups by name; every compiled group when absent.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    /// Simulated devices, in registry order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Request the protocol calls answer.
    #[serde(default)]
    pub response: Option<ResponseConfig>,
}

/// One stored image.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SlotConfig {
    /// Store location, e.g. `.ram.0`.
    pub location: String,
    /// Path of the raw bytecode file.
    pub path: PathBuf,
}

/// Harness limits.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Stack size in bytes.
    pub stack_size: usize,
    /// Taken jumps allowed per run.
    pub branch_budget: u32,
    /// Skip the trailing-`exit` check.
    pub no_return: bool,
    /// Largest loadable image.
    pub image_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            stack_size: MIN_STACK_SIZE,
            branch_budget: DEFAULT_BRANCH_BUDGET,
            no_return: false,
            image_capacity: DEFAULT_IMAGE_CAPACITY,
        }
    }
}

/// A simulated sensor or actuator.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Name used in logs.
    pub name: String,
    /// Device class code.
    pub class: u8,
    /// Initial value.
    #[serde(default)]
    pub value: [i16; 3],
    /// Unit code.
    #[serde(default)]
    pub unit: u8,
    /// Decimal scale.
    #[serde(default)]
    pub scale: i8,
    /// Valid dimensions.
    #[serde(default = "one")]
    pub dims: u8,
    /// Whether writes are accepted.
    #[serde(default)]
    pub writable: bool,
}

fn one() -> u8 {
    1
}

/// The request a run responds to.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseConfig {
    /// Message id.
    #[serde(default)]
    pub message_id: u16,
    /// Token bytes.
    #[serde(default)]
    pub token: Vec<u8>,
}

impl RunnerConfig {
    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse runner config")
    }

    /// Reads and parses a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))
    }

    /// Harness limits as a [`SandboxConfig`].
    pub fn sandbox_config(&self) -> SandboxConfig {
        let flags = if self.limits.no_return {
            ExecFlags::NO_RETURN
        } else {
            ExecFlags::NONE
        };
        SandboxConfig {
            stack_size: self.limits.stack_size,
            branch_budget: self.limits.branch_budget,
            flags,
            image_capacity: self.limits.image_capacity,
        }
    }

    /// A registry with the configured groups enabled.
    pub fn registry(&self) -> Result<CallRegistry> {
        let Some(names) = &self.groups else {
            return Ok(CallRegistry::standard());
        };
        let mut groups = Vec::with_capacity(names.len());
        for name in names {
            let group =
                CallGroup::from_name(name).ok_or_else(|| anyhow!("unknown call group '{name}'"))?;
            groups.push(group);
        }
        CallRegistry::with_groups(&groups).context("build call registry")
    }

    /// Reads every slot image into a fresh store.
    pub fn store(&self, base_dir: &Path) -> Result<RamStore> {
        let mut store = RamStore::new(self.limits.image_capacity);
        for slot in &self.slots {
            let path = base_dir.join(&slot.path);
            let image = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            store
                .install(&slot.location, &image)
                .with_context(|| format!("install {} at {}", path.display(), slot.location))?;
        }
        Ok(store)
    }

    /// The configured devices.
    pub fn devices(&self) -> StaticDevices {
        let mut devices = StaticDevices::new();
        for d in &self.devices {
            devices.push(StaticDevice {
                name: d.name.clone(),
                class: d.class,
                value: Phydat {
                    val: d.value,
                    unit: d.unit,
                    scale: d.scale,
                },
                dims: d.dims,
                writable: d.writable,
            });
        }
        devices
    }

    /// Initial response state.
    pub fn response_state(&self) -> ResponseState {
        self.response
            .as_ref()
            .map(|r| ResponseState::new(r.message_id, &r.token))
            .unwrap_or_default()
    }
}
