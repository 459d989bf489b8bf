// SPDX-License-Identifier: MIT

//! Container (docker) runtime driver, grounded in
//! `original_source/zhypervisor/clients/dockermachine.py::DockerMachine`.

use std::os::unix::process::CommandExt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};
use zd_core::{DiskId, Error, MachineId, MachineSpec, Result};

use crate::argvalue::{get_str, get_u64, value_to_arg};
use crate::driver::{ChildHandle, DiskResolver, ProcessStatus, RuntimeDriver, Spawned};
use crate::subprocess::{run_with_timeout, CONTAINER_CLI_TIMEOUT};

/// Runs machines as `docker run` containers, managed by container name
/// (always the machine id — no separate handle bookkeeping needed for
/// stop/kill).
pub struct ContainerDriver {
    docker_cli: String,
}

impl Default for ContainerDriver {
    fn default() -> Self {
        Self { docker_cli: "docker".to_string() }
    }
}

impl ContainerDriver {
    pub fn new(docker_cli: impl Into<String>) -> Self {
        Self { docker_cli: docker_cli.into() }
    }
}

#[async_trait]
impl RuntimeDriver for ContainerDriver {
    fn build_argv(&self, spec: &MachineSpec, resolver: &dyn DiskResolver, _tap: Option<&str>) -> Result<Vec<String>> {
        let machine_id = spec.machine_id.to_string();
        let hostname = get_str(&spec.properties, "hostname").unwrap_or(&machine_id);

        let mut argv = vec![
            self.docker_cli.clone(),
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            machine_id.clone(),
            "--hostname".to_string(),
            hostname.to_string(),
        ];

        if let Some(ports) = spec.properties.get("ports").and_then(|v| v.as_array()) {
            for pair in ports {
                let pair = pair.as_array().ok_or_else(|| Error::ValidationFailed("ports entry must be a pair".to_string()))?;
                let host = pair.first().and_then(|v| v.as_u64()).ok_or_else(|| {
                    Error::ValidationFailed("ports entry missing host port".to_string())
                })?;
                let container = pair.get(1).and_then(|v| v.as_u64()).ok_or_else(|| {
                    Error::ValidationFailed("ports entry missing container port".to_string())
                })?;
                argv.push("-p".to_string());
                argv.push(format!("{host}:{container}"));
            }
        }

        if let Some(volumes) = spec.properties.get("volumes").and_then(|v| v.as_array()) {
            for volume in volumes {
                let disk_name = volume
                    .get("disk")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::ValidationFailed("volume entry missing `disk`".to_string()))?;
                let mountpoint = volume
                    .get("mountpoint")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::ValidationFailed("volume entry missing `mountpoint`".to_string()))?;
                let disk_id = DiskId::parse(disk_name)?;
                let path = resolver
                    .resolve(&disk_id)
                    .ok_or_else(|| Error::NotFound(format!("disk {disk_id} not found")))?;
                argv.push("-v".to_string());
                argv.push(format!("{}:{}", path.display(), mountpoint));
            }
        }

        if let Some(stopsignal) = spec.properties.get("stopsignal") {
            argv.push("--stop-signal".to_string());
            argv.push(value_to_arg(stopsignal));
        }

        let timeout = get_u64(&spec.properties, "timeout", 25);
        argv.push("--stop-timeout".to_string());
        argv.push(timeout.to_string());

        let image = get_str(&spec.properties, "image")
            .ok_or_else(|| Error::ValidationFailed("container machine requires properties.image".to_string()))?;
        argv.push(image.to_string());

        if let Some(cmd) = spec.properties.get("cmd") {
            argv.push(value_to_arg(cmd));
        }

        Ok(argv)
    }

    async fn spawn(&self, machine_id: &MachineId, argv: &[String]) -> Result<Spawned> {
        let (program, rest) = argv.split_first().ok_or_else(|| Error::RuntimeError("empty argv".to_string()))?;
        info!(%machine_id, ?argv, "spawning docker run");
        let mut cmd = Command::new(program);
        cmd.args(rest).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| Error::SpawnFailed { machine_id: machine_id.to_string(), message: e.to_string() })?;
        let pid = child.id().ok_or_else(|| Error::RuntimeError("spawned child has no pid".to_string()))?;

        Ok(Spawned { handle: ChildHandle { pid, stdin: None }, child })
    }

    async fn stop_graceful(&self, _handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()> {
        info!(%machine_id, "running docker stop");
        let mut cmd = Command::new(&self.docker_cli);
        cmd.args(["stop", machine_id.as_str()]);
        run_with_timeout(cmd, CONTAINER_CLI_TIMEOUT, "docker stop").await?;
        Ok(())
    }

    async fn kill(&self, handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()> {
        info!(%machine_id, "running docker kill");
        let mut cmd = Command::new(&self.docker_cli);
        cmd.args(["kill", machine_id.as_str()]);
        if let Err(e) = run_with_timeout(cmd, CONTAINER_CLI_TIMEOUT, "docker kill").await {
            warn!(%machine_id, error = %e, "docker kill failed, falling back to OS-level signal");
        }

        // Belt-and-braces: guarantee the process group is gone even if the
        // docker daemon failed to honor the kill (e.g. it is itself wedged).
        let pgid = nix::unistd::Pid::from_raw(handle.pid as i32);
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL);
        Ok(())
    }

    fn status(&self, handle: &ChildHandle) -> ProcessStatus {
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(handle.pid as i32), None) {
            Ok(()) => ProcessStatus::Running,
            Err(_) => ProcessStatus::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use zd_core::{MachineId, MachineOptions, RuntimeKind};

    struct MapResolver(HashMap<DiskId, PathBuf>);
    impl DiskResolver for MapResolver {
        fn resolve(&self, disk_id: &DiskId) -> Option<PathBuf> {
            self.0.get(disk_id).cloned()
        }
    }

    fn spec_with(properties: IndexMap<String, serde_json::Value>) -> MachineSpec {
        MachineSpec {
            machine_id: MachineId::parse("web1").unwrap(),
            kind: RuntimeKind(RuntimeKind::CONTAINER.to_string()),
            options: MachineOptions::default(),
            properties,
        }
    }

    #[test]
    fn build_argv_includes_name_hostname_and_image() {
        let mut properties = IndexMap::new();
        properties.insert("image".to_string(), serde_json::json!("nginx:latest"));
        let spec = spec_with(properties);
        let resolver = MapResolver(HashMap::new());
        let driver = ContainerDriver::default();
        let argv = driver.build_argv(&spec, &resolver, None).unwrap();

        assert_eq!(argv[0], "docker");
        assert!(argv.contains(&"--name".to_string()));
        assert!(argv.contains(&"web1".to_string()));
        assert!(argv.contains(&"nginx:latest".to_string()));
        assert!(argv.contains(&"--stop-timeout".to_string()));
        assert!(argv.contains(&"25".to_string()));
    }

    #[test]
    fn build_argv_missing_image_errors() {
        let spec = spec_with(IndexMap::new());
        let resolver = MapResolver(HashMap::new());
        let driver = ContainerDriver::default();
        let err = driver.build_argv(&spec, &resolver, None).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[test]
    fn build_argv_maps_ports_and_volumes() {
        let mut properties = IndexMap::new();
        properties.insert("image".to_string(), serde_json::json!("redis"));
        properties.insert("ports".to_string(), serde_json::json!([[8080, 80]]));
        properties.insert("volumes".to_string(), serde_json::json!([{"disk": "d1.bin", "mountpoint": "/data"}]));
        let spec = spec_with(properties);

        let mut disks = HashMap::new();
        disks.insert(DiskId::parse("d1.bin").unwrap(), PathBuf::from("/datastore/d1.bin"));
        let resolver = MapResolver(disks);

        let driver = ContainerDriver::default();
        let argv = driver.build_argv(&spec, &resolver, None).unwrap();

        let port_idx = argv.iter().position(|a| a == "-p").unwrap();
        assert_eq!(argv[port_idx + 1], "8080:80");
        let vol_idx = argv.iter().position(|a| a == "-v").unwrap();
        assert_eq!(argv[vol_idx + 1], "/datastore/d1.bin:/data");
    }
}
