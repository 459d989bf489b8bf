// SPDX-License-Identifier: MIT

//! Emulator (qemu) runtime driver, grounded in
//! `original_source/zhypervisor/clients/qmachine.py::QMachine`.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;
use zd_core::{DiskId, Error, MachineId, MachineSpec, Result};

use crate::argvalue::{get_u64, value_to_arg};
use crate::driver::{format_args, ChildHandle, DiskResolver, ProcessStatus, RuntimeDriver, Spawned};

/// Path to the helper binary that attaches a freshly-created TAP device to
/// the host bridge; passed to qemu as the `-net tap` `script=` hook.
pub struct EmulatorDriver {
    bridge_attach_path: PathBuf,
}

impl EmulatorDriver {
    pub fn new(bridge_attach_path: impl Into<PathBuf>) -> Self {
        Self { bridge_attach_path: bridge_attach_path.into() }
    }

    fn system_args(spec: &MachineSpec) -> Vec<String> {
        let cores = get_u64(&spec.properties, "cores", 1);
        let mem = get_u64(&spec.properties, "mem", 256);
        let mut args = vec![
            "-monitor".to_string(),
            "stdio".to_string(),
            "-machine".to_string(),
            "accel=kvm".to_string(),
            "-smp".to_string(),
            format!("cpus={cores}"),
            "-m".to_string(),
            mem.to_string(),
            "-boot".to_string(),
            "cd".to_string(),
        ];
        if let Some(vnc) = spec.properties.get("vnc").and_then(|v| v.as_u64()) {
            args.push("-vnc".to_string());
            args.push(format!(":{vnc}"));
        }
        args
    }

    fn drive_args(spec: &MachineSpec, resolver: &dyn DiskResolver) -> Result<Vec<String>> {
        let mut args = Vec::new();
        let drives = match spec.properties.get("drives").and_then(|v| v.as_array()) {
            Some(d) => d,
            None => return Ok(args),
        };
        for drive in drives {
            let disk_name = drive
                .get("disk")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::ValidationFailed("drive entry missing `disk`".to_string()))?;
            let disk_id = DiskId::parse(disk_name)?;
            let path = resolver
                .resolve(&disk_id)
                .ok_or_else(|| Error::NotFound(format!("disk {disk_id} not found")))?;

            let mut entries: Vec<(String, String)> = vec![("file".to_string(), path.display().to_string())];
            for key in ["if", "index", "media"] {
                if let Some(v) = drive.get(key) {
                    entries.push((key.to_string(), value_to_arg(v)));
                }
            }
            if let Some(formatted) = format_args(&entries) {
                args.push("-drive".to_string());
                args.push(formatted);
            }
        }
        Ok(args)
    }

    fn network_args(spec: &MachineSpec, tap: Option<&str>, bridge_attach_path: &std::path::Path) -> Result<Vec<String>> {
        let mut args = Vec::new();
        let netifaces = match spec.properties.get("netifaces").and_then(|v| v.as_array()) {
            Some(n) => n,
            None => return Ok(args),
        };
        for iface in netifaces {
            let iface_type = iface
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::ValidationFailed("netiface entry missing `type`".to_string()))?;

            let mut entries: Vec<(String, String)> = vec![("type".to_string(), iface_type.to_string())];
            if iface_type == "tap" {
                if let Some(ifname) = iface.get("ifname").and_then(|v| v.as_str()) {
                    entries.push(("ifname".to_string(), ifname.to_string()));
                } else if let Some(tap) = tap {
                    entries.push(("ifname".to_string(), tap.to_string()));
                }
                entries.push(("script".to_string(), bridge_attach_path.display().to_string()));
                entries.push(("downscript".to_string(), "no".to_string()));
            } else if let Some(obj) = iface.as_object() {
                for (k, v) in obj {
                    if k == "type" {
                        continue;
                    }
                    entries.push((k.clone(), value_to_arg(v)));
                }
            }

            if let Some(formatted) = format_args(&entries) {
                args.push("-net".to_string());
                args.push(formatted);
            }
        }
        Ok(args)
    }
}

#[async_trait]
impl RuntimeDriver for EmulatorDriver {
    fn build_argv(&self, spec: &MachineSpec, resolver: &dyn DiskResolver, tap: Option<&str>) -> Result<Vec<String>> {
        let mut argv = vec!["qemu-system-x86_64".to_string()];
        argv.extend(Self::system_args(spec));
        argv.extend(Self::drive_args(spec, resolver)?);
        argv.extend(Self::network_args(spec, tap, &self.bridge_attach_path)?);
        Ok(argv)
    }

    async fn spawn(&self, machine_id: &MachineId, argv: &[String]) -> Result<Spawned> {
        let (program, rest) = argv.split_first().ok_or_else(|| Error::RuntimeError("empty argv".to_string()))?;
        info!(%machine_id, ?argv, "spawning qemu");
        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::SpawnFailed { machine_id: machine_id.to_string(), message: e.to_string() })?;
        let pid = child.id().ok_or_else(|| Error::RuntimeError("spawned child has no pid".to_string()))?;
        let stdin = child.stdin.take();

        Ok(Spawned { handle: ChildHandle { pid, stdin }, child })
    }

    async fn stop_graceful(&self, handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        info!(%machine_id, "sending system_powerdown to qemu monitor");
        let stdin = handle
            .stdin
            .as_mut()
            .ok_or_else(|| Error::RuntimeError("no stdin handle for qemu monitor".to_string()))?;
        stdin
            .write_all(b"system_powerdown\n")
            .await
            .map_err(|e| Error::RuntimeError(format!("failed to write to qemu monitor: {e}")))?;
        stdin.flush().await.map_err(|e| Error::RuntimeError(format!("failed to flush qemu monitor: {e}")))?;
        Ok(())
    }

    async fn kill(&self, handle: &mut ChildHandle, machine_id: &MachineId) -> Result<()> {
        info!(%machine_id, pid = handle.pid, "sending SIGTERM to qemu process group");
        let pgid = nix::unistd::Pid::from_raw(handle.pid as i32);
        nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGTERM)
            .map_err(|e| Error::RuntimeError(format!("failed to signal process group: {e}")))?;
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
    use zd_core::{MachineId, MachineOptions, RuntimeKind};

    struct MapResolver(HashMap<DiskId, PathBuf>);
    impl DiskResolver for MapResolver {
        fn resolve(&self, disk_id: &DiskId) -> Option<PathBuf> {
            self.0.get(disk_id).cloned()
        }
    }

    fn spec_with(properties: IndexMap<String, serde_json::Value>) -> MachineSpec {
        MachineSpec {
            machine_id: MachineId::parse("vm1").unwrap(),
            kind: RuntimeKind(RuntimeKind::EMULATOR.to_string()),
            options: MachineOptions::default(),
            properties,
        }
    }

    #[test]
    fn build_argv_includes_system_and_drive_args() {
        let mut properties = IndexMap::new();
        properties.insert("cores".to_string(), serde_json::json!(2));
        properties.insert("mem".to_string(), serde_json::json!(512));
        properties.insert(
            "drives".to_string(),
            serde_json::json!([{"disk": "d1.bin", "if": "virtio", "index": 0}]),
        );
        let spec = spec_with(properties);

        let mut disks = HashMap::new();
        disks.insert(DiskId::parse("d1.bin").unwrap(), PathBuf::from("/data/d1.bin"));
        let resolver = MapResolver(disks);

        let driver = EmulatorDriver::new("/usr/local/bin/zd-bridge-attach");
        let argv = driver.build_argv(&spec, &resolver, None).unwrap();

        assert_eq!(argv[0], "qemu-system-x86_64");
        assert!(argv.contains(&"cpus=2".to_string()));
        assert!(argv.iter().any(|a| a == "512"));
        let drive_idx = argv.iter().position(|a| a == "-drive").unwrap();
        assert_eq!(argv[drive_idx + 1], "file=/data/d1.bin,if=virtio,index=0");
    }

    #[test]
    fn build_argv_missing_disk_errors() {
        let mut properties = IndexMap::new();
        properties.insert("drives".to_string(), serde_json::json!([{"disk": "missing.bin"}]));
        let spec = spec_with(properties);
        let resolver = MapResolver(HashMap::new());
        let driver = EmulatorDriver::new("/usr/local/bin/zd-bridge-attach");
        let err = driver.build_argv(&spec, &resolver, None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn build_argv_tap_netiface_uses_allocated_name() {
        let mut properties = IndexMap::new();
        properties.insert("netifaces".to_string(), serde_json::json!([{"type": "tap"}]));
        let spec = spec_with(properties);
        let resolver = MapResolver(HashMap::new());
        let driver = EmulatorDriver::new("/usr/local/bin/zd-bridge-attach");
        let argv = driver.build_argv(&spec, &resolver, Some("tap7")).unwrap();
        let net_idx = argv.iter().position(|a| a == "-net").unwrap();
        assert!(argv[net_idx + 1].starts_with("tap,ifname=tap7,script="));
    }

    #[test]
    fn build_argv_vnc_appends_port() {
        let mut properties = IndexMap::new();
        properties.insert("vnc".to_string(), serde_json::json!(1));
        let spec = spec_with(properties);
        let resolver = MapResolver(HashMap::new());
        let driver = EmulatorDriver::new("/usr/local/bin/zd-bridge-attach");
        let argv = driver.build_argv(&spec, &resolver, None).unwrap();
        let vnc_idx = argv.iter().position(|a| a == "-vnc").unwrap();
        assert_eq!(argv[vnc_idx + 1], ":1");
    }
}
