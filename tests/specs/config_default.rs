//! Missing config: a default is written and the daemon exits without
//! starting (spec.md §6's CLI surface).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::process::Command;

use assert_cmd::cargo::cargo_bin;

use crate::prelude::config_path_for;

#[test]
fn missing_config_writes_default_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = config_path_for(dir.path());

    let output = Command::new(cargo_bin("zd")).args(["-c", config_path.to_str().unwrap()]).output().unwrap();

    assert!(output.status.success());
    assert!(config_path.exists());

    let raw = std::fs::read_to_string(&config_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(parsed["datastores"]["default"].is_object());
}

#[test]
fn version_flag_prints_and_exits() {
    let output = Command::new(cargo_bin("zd")).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("zd "));
}
