// SPDX-License-Identifier: MIT

//! Backing-file provisioning for disk variants (spec.md §3, §9).
//!
//! Resolved from `original_source/zhypervisor/clients/qmachine.py`'s
//! `QDisk.init`/`IsoDisk.init`: an emulated-disk's backing file must *not*
//! already exist (provisioned via `qemu-img create`); an ISO's backing file
//! must already exist (never created). This asymmetry is intentional.

use std::path::Path;

use tokio::process::Command;
use tracing::info;
use zd_core::{DiskSpec, DiskType, Error, Result};

/// Provision the backing file for `spec` at `path` if it does not already
/// exist in a way appropriate to `spec.options.disk_type`.
///
/// - `EmulatedDisk`: fails with [`Error::ValidationFailed`] if the file
///   already exists; otherwise runs `qemu-img create -f <fmt> <path>
///   <size_mb>M`.
/// - `Iso`: fails with [`Error::ValidationFailed`] if the file does *not*
///   already exist; never creates it.
pub async fn provision_disk(spec: &DiskSpec, path: &Path) -> Result<()> {
    match spec.options.disk_type {
        DiskType::EmulatedDisk => {
            if path.exists() {
                return Err(Error::ValidationFailed(format!(
                    "disk already exists: {}",
                    path.display()
                )));
            }
            let fmt = spec.fmt().ok_or_else(|| {
                Error::ValidationFailed("emulated-disk requires properties.fmt".to_string())
            })?;
            let size_mb = spec.size_mb().ok_or_else(|| {
                Error::ValidationFailed("emulated-disk requires properties.size_mb".to_string())
            })?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let args = [
                "create".to_string(),
                "-f".to_string(),
                fmt.to_string(),
                path.display().to_string(),
                format!("{size_mb}M"),
            ];
            info!(disk_id = %spec.disk_id, ?args, "provisioning emulated disk with qemu-img");
            let output = Command::new("qemu-img")
                .args(&args)
                .output()
                .await
                .map_err(|e| Error::RuntimeError(format!("qemu-img create failed: {e}")))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::RuntimeError(format!(
                    "qemu-img create exited with {}: {}",
                    output.status, stderr
                )));
            }
            Ok(())
        }
        DiskType::Iso => {
            if !path.exists() {
                return Err(Error::ValidationFailed(format!(
                    "ISO must already exist: {}",
                    path.display()
                )));
            }
            Ok(())
        }
    }
}

/// Delete the backing file for `spec` at `path`, per variant semantics.
///
/// `EmulatedDisk`: unlinks the file. `Iso`: left intact (the daemon never
/// owns the lifecycle of ISO images it did not create).
pub fn delete_disk(spec: &DiskSpec, path: &Path) -> Result<()> {
    match spec.options.disk_type {
        DiskType::EmulatedDisk => {
            std::fs::remove_file(path)?;
            Ok(())
        }
        DiskType::Iso => Ok(()),
    }
}
