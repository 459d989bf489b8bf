// SPDX-License-Identifier: MIT

use super::*;
use crate::id::MachineId;

#[test]
fn machine_options_default_timeout_is_30() {
    let opts: MachineOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(opts.timeout_s, 30);
    assert!(!opts.autostart);
    assert!(!opts.respawn);
}

#[test]
fn machine_spec_round_trips_through_json() {
    let spec = MachineSpec {
        machine_id: MachineId::parse("m1").unwrap(),
        kind: RuntimeKind(RuntimeKind::EMULATOR.to_string()),
        options: MachineOptions {
            autostart: true,
            respawn: false,
            timeout_s: 10,
        },
        properties: PropertyMap::new(),
    };
    let json = serde_json::to_string(&spec).unwrap();
    let back: MachineSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(spec, back);
}

#[test]
fn disk_type_suffix_rules() {
    assert_eq!(DiskType::EmulatedDisk.required_suffix(), ".bin");
    assert_eq!(DiskType::Iso.required_suffix(), ".iso");
}

#[test]
fn disk_type_serializes_kebab_case() {
    let json = serde_json::to_string(&DiskType::EmulatedDisk).unwrap();
    assert_eq!(json, "\"emulated-disk\"");
}
