//! End-to-end HTTP API scenarios against a live `zd` process (spec.md §8,
//! scenarios 1 and 2). Uses a `docker`-kind machine since it needs no
//! kernel virtualization support; skipped if `docker` is not on `PATH`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::prelude::{has_docker, wait_for, ZdProcess, WAIT_MAX_MS};

fn container_spec() -> serde_json::Value {
    serde_json::json!({
        "type": "docker",
        "options": { "respawn": false },
        "properties": { "image": "alpine:latest", "cmd": ["sleep", "300"] }
    })
}

#[test]
fn create_start_stop_round_trip() {
    if !has_docker() {
        eprintln!("skipping: docker not on PATH");
        return;
    }
    let zd = ZdProcess::start();
    let client = reqwest::blocking::Client::new();

    let resp = client.put(zd.url("/machine/m1")).json(&container_spec()).send().unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<serde_json::Value>().unwrap(), "m1");

    let resp = client.get(zd.url("/machine/m1/start")).send().unwrap();
    assert_eq!(resp.status(), 200);

    let running = wait_for(WAIT_MAX_MS, || {
        let listed: serde_json::Value = client.get(zd.url("/machine?summary=true")).send().unwrap().json().unwrap();
        listed.as_array().unwrap().iter().any(|m| m["machine_id"] == "m1" && m["_status"] == "running")
    });
    assert!(running, "m1 did not reach running");

    let resp = client.get(zd.url("/machine/m1/stop")).send().unwrap();
    assert_eq!(resp.status(), 200);

    let stopped = wait_for(WAIT_MAX_MS, || {
        let listed: serde_json::Value = client.get(zd.url("/machine?summary=true")).send().unwrap().json().unwrap();
        listed.as_array().unwrap().iter().any(|m| m["machine_id"] == "m1" && m["_status"] == "stopped")
    });
    assert!(stopped, "m1 did not reach stopped within 30s");
}

#[test]
fn delete_while_running_is_rejected() {
    if !has_docker() {
        eprintln!("skipping: docker not on PATH");
        return;
    }
    let zd = ZdProcess::start();
    let client = reqwest::blocking::Client::new();

    client.put(zd.url("/machine/m1")).json(&container_spec()).send().unwrap();
    client.get(zd.url("/machine/m1/start")).send().unwrap();

    let running = wait_for(WAIT_MAX_MS, || {
        let listed: serde_json::Value = client.get(zd.url("/machine?summary=true")).send().unwrap().json().unwrap();
        listed.as_array().unwrap().iter().any(|m| m["machine_id"] == "m1" && m["_status"] == "running")
    });
    assert!(running, "m1 did not reach running");

    let resp = client.delete(zd.url("/machine/m1")).send().unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client.get(zd.url("/machine/m1")).send().unwrap();
    assert_eq!(resp.status(), 200);
}
