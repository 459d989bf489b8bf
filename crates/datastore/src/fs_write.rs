// SPDX-License-Identifier: MIT

//! Crash-safe full-file rewrite: write to a temp file, fsync, rename, fsync
//! the directory. Ported from the checkpoint discipline the daemon already
//! uses for its own snapshots, applied here to the much smaller per-entity
//! manifests (spec.md §9, "Config mutation atomicity").

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zd_core::Result;

/// Atomically replace the contents of `path` with `data`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .expect("manifest paths always have a parent directory");
    std::fs::create_dir_all(parent)?;

    let tmp_path = tmp_path_for(path);
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    if let Ok(dir) = File::open(parent) {
        // Best-effort: not all platforms/filesystems support fsync on a
        // directory handle, and failure here does not mean the rename
        // itself was lost.
        let _ = dir.sync_all();
    }

    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}
