// SPDX-License-Identifier: MIT

//! Datastore (A): a rooted directory holding JSON manifests and raw disk
//! bytes, identified by a `.datastore.json` marker file (spec.md §3, §4.1).

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zd_core::{Error, Result};

const MARKER_FILE: &str = ".datastore.json";
const MACHINES_DIR: &str = "machines";
const DISKS_DIR: &str = "disks";

/// A rooted directory holding machine/disk manifests and disk bytes.
#[derive(Debug, Clone)]
pub struct Datastore {
    name: String,
    root: PathBuf,
}

impl Datastore {
    /// Open (or initialize) a datastore rooted at `path`.
    ///
    /// Ensures `path`, `machines/`, and `disks/` exist. Verifies the
    /// `.datastore.json` marker; if missing and `init_ok` is false, fails
    /// with [`Error::DatastoreUninitialized`]; if `init_ok` is true, creates
    /// the marker and the subdirectories.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>, init_ok: bool) -> Result<Self> {
        let name = name.into();
        let root = path.into();
        std::fs::create_dir_all(&root)?;

        let marker = root.join(MARKER_FILE);
        if !marker.exists() {
            if !init_ok {
                return Err(Error::DatastoreUninitialized(name));
            }
            warn!(datastore = %name, path = %root.display(), "initializing new datastore");
            std::fs::write(&marker, b"{}")?;
        }

        std::fs::create_dir_all(root.join(MACHINES_DIR))?;
        std::fs::create_dir_all(root.join(DISKS_DIR))?;

        info!(datastore = %name, path = %root.display(), "datastore opened");
        Ok(Self { name, root })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn machines_dir(&self) -> PathBuf {
        self.root.join(MACHINES_DIR)
    }

    pub fn disks_dir(&self) -> PathBuf {
        self.root.join(DISKS_DIR)
    }

    /// Join the datastore root with the given path segments. Does not
    /// validate existence of the resulting path.
    pub fn resolve(&self, segments: &[&str]) -> PathBuf {
        let mut path = self.root.clone();
        for seg in segments {
            path.push(seg);
        }
        path
    }

    /// Lazily list file paths directly beneath `subdir` whose name ends with
    /// `suffix`. Finite; the returned iterator is not restartable once
    /// exhausted.
    pub fn list(&self, subdir: &str, suffix: &str) -> Result<impl Iterator<Item = PathBuf>> {
        let dir = self.root.join(subdir);
        std::fs::create_dir_all(&dir)?;
        let suffix = suffix.to_string();
        let entries = std::fs::read_dir(&dir)?;
        Ok(entries.filter_map(move |entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(&suffix) {
                Some(path)
            } else {
                None
            }
        }))
    }
}
