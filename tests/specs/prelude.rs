//! Test helpers for black-box `zd` daemon specs (spec.md §8's end-to-end
//! scenarios, driven over the real HTTP API against a real child process).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

pub const POLL_INTERVAL_MS: u64 = 20;
pub const WAIT_MAX_MS: u64 = 5000;

/// Poll a condition until it returns true or the timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
    false
}

fn zd_binary() -> PathBuf {
    assert_cmd::cargo::cargo_bin("zd")
}

/// A running `zd` daemon, bound to a scratch datastore and a free port,
/// killed on drop.
pub struct ZdProcess {
    child: Child,
    pub base_url: String,
    _datastore_dir: tempfile::TempDir,
    _config_dir: tempfile::TempDir,
}

impl ZdProcess {
    /// Start `zd` against a fresh datastore, polling until the HTTP API answers.
    pub fn start() -> Self {
        let datastore_dir = tempfile::tempdir().unwrap();
        let config_dir = tempfile::tempdir().unwrap();
        let config_path = config_dir.path().join("zd.json");
        let port = pick_free_port();

        let config = serde_json::json!({
            "nodename": "test-node",
            "datastores": {
                "default": { "path": datastore_dir.path(), "init": true }
            },
            "apiport": port,
        });
        std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let child = Command::new(zd_binary())
            .args(["-c", config_path.to_str().unwrap()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .expect("zd should spawn");

        let base_url = format!("http://127.0.0.1:{port}/api/v1");
        let proc = Self { child, base_url, _datastore_dir: datastore_dir, _config_dir: config_dir };

        let ready = wait_for(WAIT_MAX_MS, || {
            reqwest::blocking::get(format!("{}/machine", proc.base_url)).map(|r| r.status().is_success()).unwrap_or(false)
        });
        assert!(ready, "zd did not become ready in time");
        proc
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for ZdProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn pick_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Path to a binary that exists on `PATH`, or `None` if absent — used to
/// skip scenarios that need a real qemu/docker install.
pub fn binary_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(name)).find(|p| p.is_file())
}

pub fn has_docker() -> bool {
    binary_on_path("docker").is_some()
}

#[allow(dead_code)]
pub fn has_qemu() -> bool {
    binary_on_path("qemu-system-x86_64").is_some()
}

pub fn config_path_for(dir: &Path) -> PathBuf {
    dir.join("zd.json")
}
