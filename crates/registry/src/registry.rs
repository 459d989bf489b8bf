// SPDX-License-Identifier: MIT

//! The registry itself: machine/disk tables, mutation gate, reconcile,
//! fan-out shutdown (spec.md §4.5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use zd_core::{DiskId, DiskSpec, Error, MachineId, MachineSpec, Result, RuntimeKind};
use zd_datastore::{disk_provision, Datastore, StateStore};
use zd_runtime::{DiskResolver, RuntimeDriver, TapManager};
use zd_supervisor::{Supervisor, SupervisorState};

/// Bounded concurrency for reconcile-on-start autostart and fan-out shutdown
/// (spec §4.5: "recommended 10").
const FANOUT_CONCURRENCY: usize = 10;

/// Authoritative controller owning every machine's [`Supervisor`] and every
/// disk's [`DiskSpec`]. Always used behind an `Arc`: it hands itself out as
/// the [`DiskResolver`] each supervisor uses to resolve disk ids to backing
/// paths, and the reconcile/autostart tasks it spawns hold a clone of it.
pub struct Registry {
    datastores: HashMap<String, Datastore>,
    drivers: HashMap<String, Arc<dyn RuntimeDriver>>,
    tap_manager: Arc<TapManager>,
    machines: RwLock<HashMap<MachineId, Arc<Supervisor>>>,
    disks: RwLock<HashMap<DiskId, DiskSpec>>,
}

impl Registry {
    /// Construct a registry over the given named datastores and runtime
    /// drivers (keyed by the runtime tag, e.g. `"q"`/`"docker"`). Fails if
    /// no datastore named `"default"` is present (spec §6: "the `default`
    /// datastore must be present").
    pub fn new(
        datastores: HashMap<String, Datastore>,
        drivers: HashMap<String, Arc<dyn RuntimeDriver>>,
        tap_manager: Arc<TapManager>,
    ) -> Result<Arc<Self>> {
        if !datastores.contains_key("default") {
            return Err(Error::ValidationFailed("no datastore named \"default\" configured".to_string()));
        }
        Ok(Arc::new(Self { datastores, drivers, tap_manager, machines: RwLock::new(HashMap::new()), disks: RwLock::new(HashMap::new()) }))
    }

    fn default_store(&self) -> StateStore<'_> {
        StateStore::new(self.datastores.get("default").expect("constructor validated a \"default\" datastore exists"))
    }

    fn driver_for(&self, kind: &RuntimeKind) -> Result<Arc<dyn RuntimeDriver>> {
        self.drivers.get(kind.as_str()).cloned().ok_or_else(|| Error::UnknownRuntime(kind.to_string()))
    }

    fn get_supervisor(&self, id: &MachineId) -> Result<Arc<Supervisor>> {
        self.machines.read().get(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
    }

    // ---- Machines -------------------------------------------------------

    pub fn list_machines(&self) -> Vec<(MachineSpec, SupervisorState)> {
        self.machines.read().values().map(|s| (s.spec(), s.state())).collect()
    }

    pub fn get_machine(&self, id: &MachineId) -> Result<(MachineSpec, SupervisorState)> {
        let sup = self.get_supervisor(id)?;
        Ok((sup.spec(), sup.state()))
    }

    /// Create or update a machine spec. See spec §4.5: a new id gets a fresh
    /// supervisor; an existing id must be `Stopped` (else `MachineBusy`) and
    /// has only its `options`/`properties` replaced in place, preserving its
    /// original `kind`/supervisor identity.
    pub fn add_machine(self: &Arc<Self>, spec: MachineSpec, persist: bool) -> Result<()> {
        let id = spec.machine_id.clone();
        let to_persist = {
            let mut machines = self.machines.write();
            match machines.get(&id) {
                Some(existing) => {
                    let mut merged = existing.spec();
                    merged.options = spec.options;
                    merged.properties = spec.properties;
                    existing.update_spec(merged.clone())?;
                    merged
                }
                None => {
                    let driver = self.driver_for(&spec.kind)?;
                    let resolver: Arc<dyn DiskResolver> = Arc::clone(self) as Arc<dyn DiskResolver>;
                    let sup = Supervisor::new(spec.clone(), driver, resolver, Arc::clone(&self.tap_manager));
                    machines.insert(id.clone(), sup);
                    spec
                }
            }
        };
        if persist {
            self.default_store().write_machine(&to_persist)?;
        }
        info!(machine_id = %id, "machine added");
        Ok(())
    }

    pub fn remove_machine(&self, id: &MachineId) -> Result<()> {
        {
            let mut machines = self.machines.write();
            let sup = machines.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
            if sup.state() != SupervisorState::Stopped {
                return Err(Error::MachineBusy(id.to_string()));
            }
            machines.remove(id);
        }
        self.default_store().remove_machine(id)?;
        info!(machine_id = %id, "machine removed");
        Ok(())
    }

    pub async fn start_machine(&self, id: &MachineId) -> Result<()> {
        self.get_supervisor(id)?.start().await
    }

    pub async fn stop_machine(&self, id: &MachineId) -> Result<()> {
        self.get_supervisor(id)?.stop_graceful().await
    }

    /// Graceful stop, escalating to `Kill` if `Stopped` isn't reached within
    /// `timeout` (spec §4.5 `ForcefulStop`).
    pub async fn forceful_stop(&self, id: &MachineId, timeout: Duration) -> Result<()> {
        let sup = self.get_supervisor(id)?;
        forceful_stop_supervisor(&sup, timeout).await
    }

    pub fn get_property(&self, id: &MachineId, key: &str) -> Result<serde_json::Value> {
        let sup = self.get_supervisor(id)?;
        sup.spec().properties.get(key).cloned().ok_or_else(|| Error::NotFound(format!("{id}:{key}")))
    }

    pub fn set_property(&self, id: &MachineId, key: &str, value: serde_json::Value) -> Result<()> {
        let sup = self.get_supervisor(id)?;
        let mut spec = sup.spec();
        spec.properties.insert(key.to_string(), value);
        sup.update_spec(spec.clone())?;
        self.default_store().write_machine(&spec)?;
        info!(machine_id = %id, key, "property set");
        Ok(())
    }

    pub fn del_property(&self, id: &MachineId, key: &str) -> Result<()> {
        let sup = self.get_supervisor(id)?;
        let mut spec = sup.spec();
        spec.properties.shift_remove(key);
        sup.update_spec(spec.clone())?;
        self.default_store().write_machine(&spec)?;
        info!(machine_id = %id, key, "property removed");
        Ok(())
    }

    // ---- Disks ------------------------------------------------------------

    pub fn list_disks(&self) -> Vec<DiskSpec> {
        self.disks.read().values().cloned().collect()
    }

    pub fn get_disk(&self, id: &DiskId) -> Result<DiskSpec> {
        self.disks.read().get(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn datastore_for(&self, name: &str) -> Result<&Datastore> {
        self.datastores.get(name).ok_or_else(|| Error::DatastoreUninitialized(name.to_string()))
    }

    /// Create-only (spec §4.5: "refuses update"). Provisions the backing
    /// file via the disk-variant asymmetry documented in
    /// `zd_datastore::disk_provision`.
    pub async fn add_disk(&self, spec: DiskSpec, persist: bool) -> Result<()> {
        if self.disks.read().contains_key(&spec.disk_id) {
            return Err(Error::ValidationFailed(format!("disk already exists: {}", spec.disk_id)));
        }
        let required_suffix = spec.options.disk_type.required_suffix();
        if !spec.disk_id.as_str().ends_with(required_suffix) {
            return Err(Error::ValidationFailed(format!(
                "disk id {} must end in {required_suffix} for a {:?} disk",
                spec.disk_id, spec.options.disk_type
            )));
        }
        let ds = self.datastore_for(&spec.options.datastore)?;
        let path = ds.disks_dir().join(spec.disk_id.as_str());
        disk_provision::provision_disk(&spec, &path).await?;

        self.disks.write().insert(spec.disk_id.clone(), spec.clone());
        if persist {
            self.default_store().write_disk(&spec)?;
        }
        info!(disk_id = %spec.disk_id, "disk added");
        Ok(())
    }

    /// Deletes the disk-variant backing file then removes it from memory
    /// and the state store. Refuses if any machine spec still references
    /// the disk id (spec §3: a stronger invariant than the original, which
    /// did not enforce this).
    pub fn remove_disk(&self, id: &DiskId) -> Result<()> {
        {
            let machines = self.machines.read();
            if machines.values().any(|s| spec_references_disk(&s.spec(), id)) {
                return Err(Error::DiskBusy(id.to_string()));
            }
        }

        let mut disks = self.disks.write();
        let spec = disks.get(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))?;
        let ds = self.datastore_for(&spec.options.datastore)?;
        let path = ds.disks_dir().join(id.as_str());
        disk_provision::delete_disk(&spec, &path)?;
        disks.remove(id);
        drop(disks);

        self.default_store().remove_disk(id)?;
        info!(disk_id = %id, "disk removed");
        Ok(())
    }

    // ---- Startup / shutdown ----------------------------------------------

    /// Load all disk manifests, then all machine manifests, then autostart
    /// every machine with `options.autostart=true` (spec §4.5).
    pub async fn reconcile(self: &Arc<Self>) -> Result<()> {
        let disk_specs = self.default_store().load_all_disks()?;
        {
            let mut disks = self.disks.write();
            for d in disk_specs {
                disks.insert(d.disk_id.clone(), d);
            }
        }

        let machine_specs = self.default_store().load_all_machines()?;
        let mut to_autostart = Vec::new();
        {
            let mut machines = self.machines.write();
            for spec in machine_specs {
                let id = spec.machine_id.clone();
                let autostart = spec.options.autostart;
                let driver = self.driver_for(&spec.kind)?;
                let resolver: Arc<dyn DiskResolver> = Arc::clone(self) as Arc<dyn DiskResolver>;
                let sup = Supervisor::new(spec, driver, resolver, Arc::clone(&self.tap_manager));
                machines.insert(id.clone(), sup);
                if autostart {
                    to_autostart.push(id);
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(FANOUT_CONCURRENCY));
        let mut handles = Vec::new();
        for id in to_autostart {
            let registry = Arc::clone(self);
            let permit = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                if let Err(e) = registry.start_machine(&id).await {
                    warn!(machine_id = %id, error = %e, "autostart failed");
                }
            }));
        }
        for h in handles {
            let _ = h.await;
        }

        info!("reconcile complete");
        Ok(())
    }

    /// Stop every machine in parallel with bounded concurrency, waiting for
    /// all to reach `Stopped` (spec §4.5 "fan-out shutdown").
    pub async fn shutdown_all(&self, timeout: Duration) {
        let sups: Vec<Arc<Supervisor>> = self.machines.read().values().cloned().collect();
        let semaphore = Arc::new(Semaphore::new(FANOUT_CONCURRENCY));
        let mut handles = Vec::new();
        for sup in sups {
            let permit = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                let machine_id = sup.machine_id().clone();
                if let Err(e) = forceful_stop_supervisor(&sup, timeout).await {
                    warn!(machine_id = %machine_id, error = %e, "shutdown stop failed");
                }
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        info!("fan-out shutdown complete");
    }
}

impl DiskResolver for Registry {
    fn resolve(&self, disk_id: &DiskId) -> Option<PathBuf> {
        let disks = self.disks.read();
        let spec = disks.get(disk_id)?;
        let ds = self.datastores.get(&spec.options.datastore)?;
        Some(ds.disks_dir().join(disk_id.as_str()))
    }
}

fn spec_references_disk(spec: &MachineSpec, disk_id: &DiskId) -> bool {
    for key in ["drives", "volumes"] {
        let Some(entries) = spec.properties.get(key).and_then(|v| v.as_array()) else {
            continue;
        };
        if entries.iter().any(|e| e.get("disk").and_then(|d| d.as_str()) == Some(disk_id.as_str())) {
            return true;
        }
    }
    false
}

async fn forceful_stop_supervisor(sup: &Arc<Supervisor>, timeout: Duration) -> Result<()> {
    if sup.state() == SupervisorState::Stopped {
        return Ok(());
    }
    let mut rx = sup.watch_state();
    if sup.state() == SupervisorState::Running {
        sup.stop_graceful().await?;
    }

    let reached = tokio::time::timeout(timeout, wait_for_stopped(&mut rx)).await;
    if reached.is_ok() {
        return Ok(());
    }

    warn!(machine_id = %sup.machine_id(), "graceful stop timed out, escalating to kill");
    sup.kill().await?;
    let mut rx = sup.watch_state();
    tokio::time::timeout(timeout, wait_for_stopped(&mut rx))
        .await
        .map_err(|_| Error::RuntimeError(format!("{} did not reach Stopped after kill", sup.machine_id())))
}

async fn wait_for_stopped(rx: &mut tokio::sync::watch::Receiver<SupervisorState>) {
    while *rx.borrow() != SupervisorState::Stopped {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
