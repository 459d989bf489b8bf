// SPDX-License-Identifier: MIT

//! The supervisor state machine itself (spec.md §4.3 transition table).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};
use zd_core::{Error, MachineId, MachineSpec, Result};
use zd_runtime::{ChildHandle, DiskResolver, RuntimeDriver, TapDevice, TapManager};

/// The anti-spin delay applied before an automatic respawn (spec.md §4.3:
/// "recommended value is 1 second"). Manual `Start` calls are not delayed.
const ANTI_SPIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Killed,
}

struct Inner {
    spec: MachineSpec,
    state: SupervisorState,
    handle: Option<ChildHandle>,
    tap: Option<TapDevice>,
    block_respawns: bool,
}

/// Owns the lifecycle of a single machine's OS process. Always used behind
/// an `Arc` so the observer task spawned by `start` can hold a reference
/// back to it.
pub struct Supervisor {
    machine_id: MachineId,
    driver: Arc<dyn RuntimeDriver>,
    resolver: Arc<dyn DiskResolver>,
    tap_manager: Arc<TapManager>,
    anti_spin_delay: Duration,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        spec: MachineSpec,
        driver: Arc<dyn RuntimeDriver>,
        resolver: Arc<dyn DiskResolver>,
        tap_manager: Arc<TapManager>,
    ) -> Arc<Self> {
        Self::with_anti_spin_delay(spec, driver, resolver, tap_manager, ANTI_SPIN_DELAY)
    }

    /// Same as [`Self::new`] but with a configurable anti-spin delay, for
    /// tests that want to exercise the respawn path without waiting a full
    /// second of wall-clock time.
    pub fn with_anti_spin_delay(
        spec: MachineSpec,
        driver: Arc<dyn RuntimeDriver>,
        resolver: Arc<dyn DiskResolver>,
        tap_manager: Arc<TapManager>,
        anti_spin_delay: Duration,
    ) -> Arc<Self> {
        let machine_id = spec.machine_id.clone();
        let (state_tx, _rx) = watch::channel(SupervisorState::Stopped);
        Arc::new(Self {
            machine_id,
            driver,
            resolver,
            tap_manager,
            anti_spin_delay,
            inner: Mutex::new(Inner { spec, state: SupervisorState::Stopped, handle: None, tap: None, block_respawns: false }),
            state_tx,
        })
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.lock().state
    }

    pub fn spec(&self) -> MachineSpec {
        self.inner.lock().spec.clone()
    }

    /// Observe state transitions (used by the registry's `ForcefulStop`
    /// wait-for-`Stopped` race).
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Replace the spec in place. Only permitted while `Stopped` (spec.md
    /// §4.5: property/spec mutations require the supervisor to be stopped).
    pub fn update_spec(&self, new_spec: MachineSpec) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != SupervisorState::Stopped {
            return Err(Error::MachineBusy(self.machine_id.to_string()));
        }
        inner.spec = new_spec;
        Ok(())
    }

    fn publish(&self, state: SupervisorState) {
        let _ = self.state_tx.send(state);
    }

    /// `Stopped -> Starting -> Running` (or back to `Stopped` on failure).
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SupervisorState::Stopped {
                return Err(Error::AlreadyRunning(self.machine_id.to_string()));
            }
            inner.state = SupervisorState::Starting;
            inner.block_respawns = false;
        }
        self.publish(SupervisorState::Starting);
        self.do_start().await
    }

    async fn do_start(self: &Arc<Self>) -> Result<()> {
        let spec = self.inner.lock().spec.clone();

        let tap = if needs_tap(&spec) {
            match self.tap_manager.acquire().await {
                Ok(tap) => Some(tap),
                Err(e) => {
                    self.fail_start();
                    return Err(e);
                }
            }
        } else {
            None
        };

        let argv = match self.driver.build_argv(&spec, self.resolver.as_ref(), tap.as_ref().map(TapDevice::name)) {
            Ok(argv) => argv,
            Err(e) => {
                if let Some(tap) = &tap {
                    self.tap_manager.release(tap).await;
                }
                self.fail_start();
                return Err(e);
            }
        };

        match self.driver.spawn(&self.machine_id, &argv).await {
            Ok(spawned) => {
                {
                    let mut inner = self.inner.lock();
                    inner.handle = Some(spawned.handle);
                    inner.tap = tap;
                    inner.state = SupervisorState::Running;
                }
                self.publish(SupervisorState::Running);
                info!(machine_id = %self.machine_id, "machine started");

                let sup = Arc::clone(self);
                tokio::spawn(async move { sup.observe(spawned.child).await });
                Ok(())
            }
            Err(e) => {
                if let Some(tap) = &tap {
                    self.tap_manager.release(tap).await;
                }
                self.fail_start();
                error!(machine_id = %self.machine_id, error = %e, "spawn failed");
                Err(e)
            }
        }
    }

    fn fail_start(&self) {
        let mut inner = self.inner.lock();
        inner.state = SupervisorState::Stopped;
        drop(inner);
        self.publish(SupervisorState::Stopped);
    }

    /// `Running -> Stopping`.
    pub async fn stop_graceful(&self) -> Result<()> {
        let mut handle = {
            let mut inner = self.inner.lock();
            if inner.state != SupervisorState::Running {
                return Err(Error::RuntimeError(format!(
                    "cannot stop_graceful a supervisor that is not Running (currently {:?})",
                    inner.state
                )));
            }
            inner.block_respawns = true;
            inner.state = SupervisorState::Stopping;
            match inner.handle.take() {
                Some(handle) => handle,
                None => return Err(Error::RuntimeError("running supervisor has no child handle".to_string())),
            }
        };
        self.publish(SupervisorState::Stopping);

        info!(machine_id = %self.machine_id, "stopping machine gracefully");
        let result = self.driver.stop_graceful(&mut handle, &self.machine_id).await;
        self.restore_handle_if_still_live(handle);
        result
    }

    /// `Running | Stopping -> Killed`.
    pub async fn kill(&self) -> Result<()> {
        let mut handle = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, SupervisorState::Running | SupervisorState::Stopping) {
                return Err(Error::RuntimeError(format!(
                    "cannot kill a supervisor in state {:?}",
                    inner.state
                )));
            }
            inner.block_respawns = true;
            inner.state = SupervisorState::Killed;
            match inner.handle.take() {
                Some(handle) => handle,
                // The observer already cleared the handle; the child is
                // already gone, nothing left to kill.
                None => return Ok(()),
            }
        };
        self.publish(SupervisorState::Killed);

        info!(machine_id = %self.machine_id, "killing machine");
        let result = self.driver.kill(&mut handle, &self.machine_id).await;
        self.restore_handle_if_still_live(handle);
        result
    }

    /// Put a taken-out handle back, unless the observer task already
    /// transitioned to `Stopped` in the meantime (the child exited while we
    /// were sending it a signal); in that case the handle is stale and is
    /// simply dropped.
    fn restore_handle_if_still_live(&self, handle: ChildHandle) {
        let mut inner = self.inner.lock();
        if inner.handle.is_none() && inner.state != SupervisorState::Stopped {
            inner.handle = Some(handle);
        }
    }

    async fn observe(self: Arc<Self>, mut child: tokio::process::Child) {
        let exit = child.wait().await;
        info!(machine_id = %self.machine_id, ?exit, "child process exited");

        let (should_respawn, tap) = {
            let mut inner = self.inner.lock();
            let prior_state = inner.state;
            inner.handle = None;
            let tap = inner.tap.take();
            let should_respawn =
                !inner.block_respawns && inner.spec.options.respawn && prior_state == SupervisorState::Running;
            inner.state = SupervisorState::Stopped;
            (should_respawn, tap)
        };
        self.publish(SupervisorState::Stopped);

        if let Some(tap) = tap {
            self.tap_manager.release(&tap).await;
        }

        if should_respawn {
            info!(machine_id = %self.machine_id, delay_ms = self.anti_spin_delay.as_millis(), "respawning after anti-spin delay");
            tokio::time::sleep(self.anti_spin_delay).await;
            if let Err(e) = self.start().await {
                warn!(machine_id = %self.machine_id, error = %e, "automatic respawn failed");
            }
        }
    }
}

fn needs_tap(spec: &MachineSpec) -> bool {
    spec.properties
        .get("netifaces")
        .and_then(|v| v.as_array())
        .map(|ifaces| ifaces.iter().any(|i| i.get("type").and_then(|t| t.as_str()) == Some("tap")))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
