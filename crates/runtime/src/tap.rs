// SPDX-License-Identifier: MIT

//! TAP device manager (B).
//!
//! Ported from `zhypervisor.util.TapDevice`: the original picked a random
//! number in `[0, 100000)` for the device suffix. This redesigns that
//! allocation as a monotonic counter with a collision probe against
//! `ip link show`, since a process-local random pick can collide across
//! daemon restarts or concurrent machines (spec.md §9 REDESIGN FLAGS).

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::process::Command;
use tracing::{info, warn};
use zd_core::Result;

use crate::subprocess::{run_with_timeout, NET_HELPER_TIMEOUT};

/// Naming scheme for counter value `n`: `tap{n}`, kept as a standalone
/// function so the allocation-uniqueness invariant is testable without a
/// `TapManager` or any host network calls.
fn candidate_name(n: u32) -> String {
    format!("tap{n}")
}

/// A TAP network device name, e.g. `tap42`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapDevice(String);

impl TapDevice {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TapDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates and releases TAP devices, avoiding collisions with devices
/// already present on the host.
pub struct TapManager {
    next: AtomicU32,
}

impl Default for TapManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TapManager {
    pub fn new() -> Self {
        Self { next: AtomicU32::new(0) }
    }

    /// Allocate and create a TAP device: probe `ip link show <name>` for a
    /// collision, advancing the counter past any name already in use, then
    /// `ip tuntap add name <name> mode tap`.
    pub async fn acquire(&self) -> Result<TapDevice> {
        loop {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            let candidate = TapDevice(candidate_name(n));

            if self.exists(&candidate).await? {
                warn!(tap = %candidate, "tap name already in use on host, skipping");
                continue;
            }

            let mut cmd = Command::new("ip");
            cmd.args(["tuntap", "add", "name", candidate.name(), "mode", "tap"]);
            run_with_timeout(cmd, NET_HELPER_TIMEOUT, "ip tuntap add").await?;
            info!(tap = %candidate, "created tap device");
            return Ok(candidate);
        }
    }

    /// Tear down a previously-acquired TAP device. Failures are logged but
    /// not fatal: the device may already be gone if its owning process died
    /// uncleanly.
    pub async fn release(&self, tap: &TapDevice) {
        let mut cmd = Command::new("ip");
        cmd.args(["link", "delete", tap.name()]);
        if let Err(e) = run_with_timeout(cmd, NET_HELPER_TIMEOUT, "ip link delete").await {
            warn!(tap = %tap, error = %e, "failed to release tap device (non-fatal)");
        }
    }

    async fn exists(&self, tap: &TapDevice) -> Result<bool> {
        let mut cmd = Command::new("ip");
        cmd.args(["link", "show", tap.name()]);
        match run_with_timeout(cmd, NET_HELPER_TIMEOUT, "ip link show").await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
