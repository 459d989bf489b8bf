// SPDX-License-Identifier: MIT

//! Runtime driver capability (C): the interface the supervisor uses to turn
//! a `MachineSpec` into a running OS process, and to stop, kill, and probe
//! it again later.

use std::path::PathBuf;

use async_trait::async_trait;
use zd_core::{DiskId, MachineId, MachineSpec, Result};

/// Resolves a disk id to the path of its backing file. Implemented by the
/// registry, which owns datastore lookups; kept as a trait here so
/// `zd-runtime` does not need to depend on `zd-registry`.
pub trait DiskResolver: Send + Sync {
    fn resolve(&self, disk_id: &DiskId) -> Option<PathBuf>;
}

/// Everything the supervisor needs to stop, kill, or probe a spawned
/// machine process, without retaining ownership of the `tokio::process::Child`
/// itself (that is moved into the observer task that awaits its exit).
pub struct ChildHandle {
    pub pid: u32,
    pub stdin: Option<tokio::process::ChildStdin>,
}

/// The result of [`RuntimeDriver::spawn`]: a handle usable for stop/kill/status,
/// plus the child itself for the caller to hand off to an exit-watcher task.
pub struct Spawned {
    pub handle: ChildHandle,
    pub child: tokio::process::Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Stopped,
}

/// Capability implemented once per machine kind (emulator, container).
#[async_trait]
pub trait RuntimeDriver: Send + Sync {
    /// Assemble the argv that would be executed for `spec`, resolving disk
    /// references via `resolver` and (for emulator machines) attaching to
    /// `tap` if one was allocated.
    fn build_argv(&self, spec: &MachineSpec, resolver: &dyn DiskResolver, tap: Option<&str>) -> Result<Vec<String>>;

    /// Spawn the process in its own process group (so it survives the
    /// daemon's own signal delivery and can be killed as a group later).
    async fn spawn(&self, machine_id: &MachineId, argv: &[String]) -> Result<Spawned>;

    /// Ask the machine to shut down cleanly.
    async fn stop_graceful(&self, handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()>;

    /// Forcefully terminate the machine.
    async fn kill(&self, handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()>;

    /// Probe whether the process behind `handle` is still alive, without
    /// reaping it (reaping happens in the supervisor's exit-watcher task).
    fn status(&self, handle: &ChildHandle) -> ProcessStatus {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(handle.pid as i32), None) {
            Ok(()) => ProcessStatus::Running,
            Err(_) => ProcessStatus::Stopped,
        }
    }
}

/// Format a property map like `{"file": "/dev/zd0", "index": 0, "if": "virtio"}`
/// into `file=/dev/zd0,index=0,if=virtio`, promoting a `"type"` key to the
/// front with no `key=` prefix (qemu's `-net`/`-drive` option-string syntax).
pub fn format_args(entries: &[(impl AsRef<str>, String)]) -> Option<String> {
    let mut parts: Vec<String> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if key.as_ref() == "type" {
            parts.insert(0, value.clone());
        } else {
            parts.push(format!("{}={value}", key.as_ref()));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}
