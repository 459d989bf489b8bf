// SPDX-License-Identifier: MIT

//! Daemon configuration (spec.md §6): `{"nodename": str, "datastores": {<name>:
//! {"path": str, "init": bool?}}, "apiport": int?}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

fn default_apiport() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatastoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub init: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub nodename: String,
    pub datastores: HashMap<String, DatastoreConfig>,
    #[serde(default = "default_apiport")]
    pub apiport: u16,
}

/// Default config, matching `original_source/zhypervisor/daemon.py::main`'s
/// literal default, minus the `access`/`state` fields spec.md §6 drops.
fn default_config() -> Config {
    let mut datastores = HashMap::new();
    datastores.insert(
        "default".to_string(),
        DatastoreConfig { path: PathBuf::from("/opt/z/datastore/machines/"), init: true },
    );
    Config { nodename: "examplenode".to_string(), datastores, apiport: default_apiport() }
}

/// Outcome of [`Config::load`]: either a usable config, or an indication that
/// a default was just written and the caller should exit without starting
/// (mirrors the original's "write default config and return" behavior).
pub enum LoadOutcome {
    Loaded(Config),
    WroteDefault { path: PathBuf },
}

impl Config {
    /// Load the config at `path`. If absent, writes a default config there
    /// and returns [`LoadOutcome::WroteDefault`] instead of reading it back.
    pub fn load(path: &Path) -> Result<LoadOutcome, LifecycleError> {
        if !path.exists() {
            let cfg = default_config();
            let body = serde_json::to_string_pretty(&cfg)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, body)?;
            return Ok(LoadOutcome::WroteDefault { path: path.to_path_buf() });
        }

        let raw = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&raw)?;
        if !cfg.datastores.contains_key("default") {
            return Err(LifecycleError::NoDefaultDatastore);
        }
        Ok(LoadOutcome::Loaded(cfg))
    }

    /// Root of the `default` datastore, used as the base for ambient state
    /// (the daemon log file) that spec.md §6's schema has no field for.
    pub fn state_dir(&self) -> &Path {
        &self.datastores.get("default").expect("load() validated a \"default\" datastore exists").path
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir().join("zd.log")
    }
}
