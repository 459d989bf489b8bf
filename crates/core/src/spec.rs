// SPDX-License-Identifier: MIT

//! Declarative machine and disk specs (spec.md §3).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{DiskId, MachineId};

/// Arbitrary property bag, preserving insertion order so manifests written
/// to disk stay stable and human-legible across round-trips.
pub type PropertyMap = IndexMap<String, Value>;

/// Supervision-level options common to every machine, independent of runtime kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineOptions {
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub respawn: bool,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

fn default_timeout_s() -> u64 {
    30
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            autostart: false,
            respawn: false,
            timeout_s: default_timeout_s(),
        }
    }
}

/// Runtime kind tag, selecting a driver from the registry in `zd-runtime`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RuntimeKind(pub String);

impl RuntimeKind {
    pub const EMULATOR: &'static str = "q";
    pub const CONTAINER: &'static str = "docker";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A machine's declarative spec: what it is, not whether it's running.
///
/// `machine_id` is carried alongside rather than as the map key everywhere,
/// since manifests on disk are one-per-file and self-describing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineSpec {
    pub machine_id: MachineId,
    #[serde(rename = "type")]
    pub kind: RuntimeKind,
    #[serde(default)]
    pub options: MachineOptions,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Disk variant tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DiskType {
    EmulatedDisk,
    Iso,
}

impl DiskType {
    pub fn required_suffix(self) -> &'static str {
        match self {
            DiskType::EmulatedDisk => ".bin",
            DiskType::Iso => ".iso",
        }
    }
}

impl std::fmt::Display for DiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiskType::EmulatedDisk => "emulated-disk",
            DiskType::Iso => "iso",
        };
        write!(f, "{s}")
    }
}

/// Disk-level options: variant tag plus which datastore holds the backing file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskOptions {
    #[serde(rename = "type")]
    pub disk_type: DiskType,
    pub datastore: String,
}

/// A disk's declarative spec (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskSpec {
    pub disk_id: DiskId,
    pub options: DiskOptions,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl DiskSpec {
    /// Requested size in MB for an emulated-disk (0 if absent/ISO).
    pub fn size_mb(&self) -> Option<u64> {
        self.properties.get("size_mb").and_then(Value::as_u64)
    }

    /// Requested qemu-img format (e.g. "qcow2") for an emulated-disk.
    pub fn fmt(&self) -> Option<&str> {
        self.properties.get("fmt").and_then(Value::as_str)
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
