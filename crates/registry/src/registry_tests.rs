use std::time::Duration;

use indexmap::IndexMap;
use zd_core::{DiskId, DiskOptions, DiskType, MachineId, MachineOptions, MachineSpec, RuntimeKind};
use zd_datastore::Datastore;
use zd_runtime::FakeRuntimeDriver;

use super::*;

fn machine_spec(id: &str, kind: &str, autostart: bool, respawn: bool) -> MachineSpec {
    MachineSpec {
        machine_id: MachineId::parse(id).unwrap(),
        kind: RuntimeKind(kind.to_string()),
        options: MachineOptions { autostart, respawn, timeout_s: 30 },
        properties: IndexMap::new(),
    }
}

fn disk_spec(id: &str, datastore: &str) -> DiskSpec {
    let mut properties = IndexMap::new();
    properties.insert("size_mb".to_string(), serde_json::json!(8));
    properties.insert("fmt".to_string(), serde_json::json!("qcow2"));
    DiskSpec {
        disk_id: DiskId::parse(id).unwrap(),
        options: DiskOptions { disk_type: DiskType::EmulatedDisk, datastore: datastore.to_string() },
        properties,
    }
}

/// Registry wired with a single "q" driver backed by `program` (default
/// `"cat"`, a process that only exits on stdin close/kill).
fn make_registry(dir: &tempfile::TempDir, program: &str) -> Arc<Registry> {
    let default_ds = Datastore::open("default", dir.path().join("default"), true).unwrap();
    let mut datastores = HashMap::new();
    datastores.insert("default".to_string(), default_ds);

    let mut drivers: HashMap<String, Arc<dyn RuntimeDriver>> = HashMap::new();
    drivers.insert("q".to_string(), Arc::new(FakeRuntimeDriver::with_program(program)));

    Registry::new(datastores, drivers, Arc::new(TapManager::new())).unwrap()
}

#[test]
fn add_machine_creates_stopped_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();

    let (spec, state) = registry.get_machine(&MachineId::parse("m1").unwrap()).unwrap();
    assert_eq!(spec.machine_id.as_str(), "m1");
    assert_eq!(state, SupervisorState::Stopped);
}

#[test]
fn add_machine_with_unknown_kind_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    let err = registry.add_machine(machine_spec("m1", "bogus", false, false), false).unwrap_err();
    assert!(matches!(err, Error::UnknownRuntime(_)));
}

#[test]
fn add_machine_persists_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_machine(machine_spec("m1", "q", false, false), true).unwrap();

    let raw = std::fs::read_to_string(dir.path().join("default").join("machines").join("m1.json")).unwrap();
    assert!(raw.contains("\"machine_id\": \"m1\""));
}

#[tokio::test]
async fn add_machine_update_while_running_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();
    registry.start_machine(&MachineId::parse("m1").unwrap()).await.unwrap();

    let err = registry.add_machine(machine_spec("m1", "q", true, false), false).unwrap_err();
    assert!(matches!(err, Error::MachineBusy(_)));
}

#[tokio::test]
async fn remove_machine_while_running_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    let id = MachineId::parse("m1").unwrap();
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();
    registry.start_machine(&id).await.unwrap();

    let err = registry.remove_machine(&id).unwrap_err();
    assert!(matches!(err, Error::MachineBusy(_)));
    // Still listed.
    assert!(registry.get_machine(&id).is_ok());
}

#[tokio::test]
async fn start_then_list_shows_running() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    let id = MachineId::parse("m1").unwrap();
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();
    registry.start_machine(&id).await.unwrap();

    let listed = registry.list_machines();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].1, SupervisorState::Running);
}

#[tokio::test]
async fn forceful_stop_escalates_to_kill_when_graceful_is_a_no_op() {
    // "yes" never reads stdin, so closing it (FakeRuntimeDriver's
    // stop_graceful) does nothing; only SIGKILL ends it.
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "yes");
    let id = MachineId::parse("m1").unwrap();
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();
    registry.start_machine(&id).await.unwrap();

    registry.forceful_stop(&id, Duration::from_millis(30)).await.unwrap();
    let (_, state) = registry.get_machine(&id).unwrap();
    assert_eq!(state, SupervisorState::Stopped);
}

#[tokio::test]
async fn set_and_del_property_require_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    let id = MachineId::parse("m1").unwrap();
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();

    registry.set_property(&id, "cores", serde_json::json!(4)).unwrap();
    assert_eq!(registry.get_property(&id, "cores").unwrap(), serde_json::json!(4));

    registry.start_machine(&id).await.unwrap();
    let err = registry.set_property(&id, "cores", serde_json::json!(8)).unwrap_err();
    assert!(matches!(err, Error::MachineBusy(_)));

    registry.del_property(&id, "cores").unwrap_err();
}

#[tokio::test]
async fn add_disk_provisions_backing_file_then_resolves_path() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_disk(disk_spec("d1.bin", "default"), true).await.unwrap_or_else(|e| panic!("{e}"));

    let backing = dir.path().join("default").join("disks").join("d1.bin");
    assert!(backing.exists());

    let resolved = registry.resolve(&DiskId::parse("d1.bin").unwrap()).unwrap();
    assert_eq!(resolved, backing);
}

#[tokio::test]
async fn add_disk_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_disk(disk_spec("d1.bin", "default"), false).await.unwrap();
    let err = registry.add_disk(disk_spec("d1.bin", "default"), false).await.unwrap_err();
    assert!(matches!(err, Error::ValidationFailed(_)));
}

#[tokio::test]
async fn add_disk_with_wrong_suffix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    let err = registry.add_disk(disk_spec("d1.txt", "default"), false).await.unwrap_err();
    assert!(matches!(err, Error::ValidationFailed(_)));
    assert!(!dir.path().join("default").join("disks").join("d1.txt").exists());
}

#[tokio::test]
async fn remove_disk_referenced_by_machine_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_disk(disk_spec("d1.bin", "default"), false).await.unwrap();

    let mut spec = machine_spec("m1", "q", false, false);
    spec.properties.insert("drives".to_string(), serde_json::json!([{"disk": "d1.bin"}]));
    registry.add_machine(spec, false).unwrap();

    let err = registry.remove_disk(&DiskId::parse("d1.bin").unwrap()).unwrap_err();
    assert!(matches!(err, Error::DiskBusy(_)));
}

#[tokio::test]
async fn remove_disk_not_referenced_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_disk(disk_spec("d1.bin", "default"), true).await.unwrap();
    registry.remove_disk(&DiskId::parse("d1.bin").unwrap()).unwrap();
    assert!(registry.get_disk(&DiskId::parse("d1.bin").unwrap()).is_err());
}

#[tokio::test]
async fn reconcile_autostarts_flagged_machines() {
    let dir = tempfile::tempdir().unwrap();
    {
        let registry = make_registry(&dir, "cat");
        registry.add_machine(machine_spec("m1", "q", true, false), true).unwrap();
        registry.add_machine(machine_spec("m2", "q", false, false), true).unwrap();
    }

    // Fresh registry over the same datastore, simulating a daemon restart.
    let registry = make_registry(&dir, "cat");
    registry.reconcile().await.unwrap();

    let (_, s1) = registry.get_machine(&MachineId::parse("m1").unwrap()).unwrap();
    let (_, s2) = registry.get_machine(&MachineId::parse("m2").unwrap()).unwrap();
    assert_eq!(s1, SupervisorState::Running);
    assert_eq!(s2, SupervisorState::Stopped);
}

#[tokio::test]
async fn shutdown_all_stops_every_running_machine() {
    let dir = tempfile::tempdir().unwrap();
    let registry = make_registry(&dir, "cat");
    registry.add_machine(machine_spec("m1", "q", false, false), false).unwrap();
    registry.add_machine(machine_spec("m2", "q", false, false), false).unwrap();
    registry.start_machine(&MachineId::parse("m1").unwrap()).await.unwrap();
    registry.start_machine(&MachineId::parse("m2").unwrap()).await.unwrap();

    registry.shutdown_all(Duration::from_secs(2)).await;

    for listed in registry.list_machines() {
        assert_eq!(listed.1, SupervisorState::Stopped);
    }
}
