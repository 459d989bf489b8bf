// SPDX-License-Identifier: MIT

//! A [`RuntimeDriver`] test double that spawns `cat` instead of real
//! qemu/docker, for supervisor and registry unit tests. Gated behind
//! `#[cfg(any(test, feature = "test-support"))]` so it never ships in the
//! release binary but is still available to this crate's own unit tests.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use zd_core::{Error, MachineId, MachineSpec, Result};

use crate::driver::{ChildHandle, DiskResolver, ProcessStatus, RuntimeDriver, Spawned};

/// Spawns `/bin/cat` (reads stdin until EOF or killed) as a stand-in process
/// so tests can exercise the supervisor's start/stop/kill/respawn machinery
/// without depending on qemu or docker being installed. Swap in `"true"` via
/// [`FakeRuntimeDriver::with_program`] to simulate a process that exits
/// immediately on its own (for respawn-policy tests).
pub struct FakeRuntimeDriver {
    program: String,
}

impl Default for FakeRuntimeDriver {
    fn default() -> Self {
        Self { program: "cat".to_string() }
    }
}

impl FakeRuntimeDriver {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl RuntimeDriver for FakeRuntimeDriver {
    fn build_argv(&self, spec: &MachineSpec, _resolver: &dyn DiskResolver, _tap: Option<&str>) -> Result<Vec<String>> {
        Ok(vec![self.program.clone(), spec.machine_id.to_string()])
    }

    async fn spawn(&self, machine_id: &MachineId, _argv: &[String]) -> Result<Spawned> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::SpawnFailed { machine_id: machine_id.to_string(), message: e.to_string() })?;
        let pid = child.id().ok_or_else(|| Error::RuntimeError("no pid".to_string()))?;
        let stdin = child.stdin.take();
        Ok(Spawned { handle: ChildHandle { pid, stdin }, child })
    }

    async fn stop_graceful(&self, handle: &mut ChildHandle, _machine_id: &MachineId) -> Result<()> {
        // Closing stdin makes `cat` see EOF and exit on its own.
        handle.stdin.take();
        Ok(())
    }

    async fn kill(&self, handle: &mut ChildHandle, _machine_id: &MachineId) -> Result<()> {
        let pid = nix::unistd::Pid::from_raw(handle.pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL);
        Ok(())
    }

    fn status(&self, handle: &ChildHandle) -> ProcessStatus {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(handle.pid as i32), None) {
            Ok(()) => ProcessStatus::Running,
            Err(_) => ProcessStatus::Stopped,
        }
    }
}
