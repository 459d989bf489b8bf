// SPDX-License-Identifier: MIT

//! State store (F): one JSON file per machine/disk manifest (spec.md §4.6).

use serde::{Deserialize, Serialize};
use tracing::info;
use zd_core::{DiskId, DiskOptions, DiskSpec, MachineId, MachineOptions, MachineSpec, PropertyMap, Result, RuntimeKind};

use crate::fs_write::write_atomic;
use crate::store::Datastore;

/// On-disk machine manifest shape (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MachineManifest {
    machine_id: MachineId,
    spec: MachineManifestSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MachineManifestSpec {
    options: MachineOptions,
    properties: PropertyMap,
    #[serde(rename = "type")]
    kind: RuntimeKind,
}

/// On-disk disk manifest shape (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskManifest {
    disk_id: DiskId,
    options: DiskOptions,
    properties: PropertyMap,
}

impl From<&MachineSpec> for MachineManifest {
    fn from(spec: &MachineSpec) -> Self {
        MachineManifest {
            machine_id: spec.machine_id.clone(),
            spec: MachineManifestSpec {
                options: spec.options.clone(),
                properties: spec.properties.clone(),
                kind: spec.kind.clone(),
            },
        }
    }
}

impl From<MachineManifest> for MachineSpec {
    fn from(m: MachineManifest) -> Self {
        MachineSpec {
            machine_id: m.machine_id,
            kind: m.spec.kind,
            options: m.spec.options,
            properties: m.spec.properties,
        }
    }
}

impl From<&DiskSpec> for DiskManifest {
    fn from(spec: &DiskSpec) -> Self {
        DiskManifest {
            disk_id: spec.disk_id.clone(),
            options: spec.options.clone(),
            properties: spec.properties.clone(),
        }
    }
}

impl From<DiskManifest> for DiskSpec {
    fn from(m: DiskManifest) -> Self {
        DiskSpec {
            disk_id: m.disk_id,
            options: m.options,
            properties: m.properties,
        }
    }
}

/// Reads and writes machine/disk manifests for a [`Datastore`].
///
/// Writes are full-file rewrites via [`write_atomic`] (temp file + fsync +
/// rename); removal is a plain unlink.
pub struct StateStore<'a> {
    datastore: &'a Datastore,
}

impl<'a> StateStore<'a> {
    pub fn new(datastore: &'a Datastore) -> Self {
        Self { datastore }
    }

    fn machine_path(&self, id: &MachineId) -> std::path::PathBuf {
        self.datastore.machines_dir().join(format!("{id}.json"))
    }

    fn disk_path(&self, id: &DiskId) -> std::path::PathBuf {
        self.datastore.disks_dir().join(format!("{id}.json"))
    }

    pub fn write_machine(&self, spec: &MachineSpec) -> Result<()> {
        let manifest = MachineManifest::from(spec);
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.machine_path(&spec.machine_id), &bytes)?;
        info!(machine_id = %spec.machine_id, "wrote machine manifest");
        Ok(())
    }

    pub fn remove_machine(&self, id: &MachineId) -> Result<()> {
        std::fs::remove_file(self.machine_path(id))?;
        info!(machine_id = %id, "removed machine manifest");
        Ok(())
    }

    pub fn load_all_machines(&self) -> Result<Vec<MachineSpec>> {
        let mut specs = Vec::new();
        for path in self.datastore.list("machines", ".json")? {
            let bytes = std::fs::read(&path)?;
            let manifest: MachineManifest = serde_json::from_slice(&bytes)?;
            specs.push(manifest.into());
        }
        Ok(specs)
    }

    pub fn write_disk(&self, spec: &DiskSpec) -> Result<()> {
        let manifest = DiskManifest::from(spec);
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.disk_path(&spec.disk_id), &bytes)?;
        info!(disk_id = %spec.disk_id, "wrote disk manifest");
        Ok(())
    }

    pub fn remove_disk(&self, id: &DiskId) -> Result<()> {
        std::fs::remove_file(self.disk_path(id))?;
        info!(disk_id = %id, "removed disk manifest");
        Ok(())
    }

    pub fn load_all_disks(&self) -> Result<Vec<DiskSpec>> {
        let mut specs = Vec::new();
        for path in self.datastore.list("disks", ".json")? {
            let bytes = std::fs::read(&path)?;
            let manifest: DiskManifest = serde_json::from_slice(&bytes)?;
            specs.push(manifest.into());
        }
        Ok(specs)
    }
}
