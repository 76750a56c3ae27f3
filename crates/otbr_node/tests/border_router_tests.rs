//! Integration tests for the border router startup sequence
//!
//! Tests complete boots against in-process backends:
//! - Dataset fallback chain across reboots
//! - Provisioning over the serial console
//! - Backbone retry and reboot policy
//! - Storage recovery and meshcop advertisement

use otbr_node::error::StorageError;
use otbr_node::platform::PlatformCall;
use otbr_node::simulated::{ACTIVE_DATASET_KEY, SETTINGS_NAMESPACE};
use otbr_node::*;
use std::io::{Cursor, Write};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

struct Boot {
    router: BorderRouter<SimulatedThreadStack>,
    probe: SimulatedProbe,
    responder: RecordingResponder,
    platform: Arc<RecordingPlatform>,
}

fn boot_with(config: Config, store: SharedStore, backbone: ScriptedBackbone, stack: SimulatedThreadStack) -> Boot {
    let probe = stack.probe();
    let responder = RecordingResponder::new();
    let platform = Arc::new(RecordingPlatform::new());
    let components = Components {
        store,
        backbone: Box::new(backbone),
        responder: Box::new(responder.clone()),
        platform: platform.clone(),
        stack,
    };
    Boot {
        router: BorderRouter::new(config, components).unwrap(),
        probe,
        responder,
        platform,
    }
}

fn boot(config: Config, store: SharedStore) -> Boot {
    let stack = SimulatedThreadStack::new(store.clone());
    boot_with(config, store, ScriptedBackbone::connecting(IP), stack)
}

/// Starts the router, waits for the main loop and stops it again.
fn run_to_mainloop(boot: &mut Boot) -> DatasetSource {
    let mesh = boot.router.start().unwrap();
    assert!(boot
        .probe
        .wait_for_call("launch_mainloop", Duration::from_secs(5)));
    boot.probe.stop();
    mesh.join().unwrap()
}

fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

#[derive(Clone, Default)]
struct Console(Arc<Mutex<Vec<u8>>>);

impl Console {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_created_network_survives_reboot() {
    let store = share(MemoryStore::new());
    let mut config = Config::test_mode();
    config.thread.auto_start = true;
    config.thread.channel = 25;

    let mut first = boot(config.clone(), store.clone());
    assert_eq!(run_to_mainloop(&mut first), DatasetSource::Created);
    let created = first.probe.active_dataset().unwrap();
    assert_eq!(created.channel, Some(25));

    let mut second = boot(config, store);
    assert_eq!(run_to_mainloop(&mut second), DatasetSource::Saved);
    let saved = second.probe.active_dataset().unwrap();
    assert_eq!(saved.network_key, created.network_key);
    assert_eq!(saved.pan_id, created.pan_id);
}

#[test]
fn test_configured_dataset_boot() {
    let dataset = OperationalDataset::new_random();
    let hex = dataset.to_tlvs().unwrap().to_hex();
    let mut config = Config::test_mode();
    config.thread.dataset_tlvs = hex;

    let mut boot = boot(config, share(MemoryStore::new()));
    assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Configured);
    assert_eq!(
        boot.probe.active_dataset().unwrap().network_key,
        dataset.network_key
    );
    assert!(boot.probe.thread_enabled());
}

#[test]
fn test_bad_configured_hex_falls_through_to_create() {
    let mut config = Config::test_mode();
    config.thread.dataset_tlvs = "0e0".to_string();
    config.thread.auto_start = true;

    let mut boot = boot(config, share(MemoryStore::new()));
    assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Created);
    assert!(boot.probe.thread_enabled());
}

#[test]
fn test_stack_init_failure_is_fatal() {
    let mut config = Config::test_mode();
    config.thread.auto_start = true;
    let store = share(MemoryStore::new());
    let stack = SimulatedThreadStack::new(store.clone()).fail_init();
    let mut boot = boot_with(config, store, ScriptedBackbone::connecting(IP), stack);

    let mesh = boot.router.start().unwrap();
    let err = mesh.join().err().unwrap();
    assert_eq!(err.code(), "E_OT_INIT");
    assert!(err.is_fatal());
    // nothing runs after a failed init, not even dataset acquisition
    assert_eq!(boot.probe.calls(), vec!["init"]);
    assert!(boot.probe.active_dataset().is_none());
}

#[test]
fn test_unprovisioned_boot_stays_disabled() {
    let mut boot = boot(Config::test_mode(), share(MemoryStore::new()));
    assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Unprovisioned);
    assert_eq!(boot.probe.role(), DeviceRole::Disabled);
    assert!(!boot.probe.ip6_enabled());
    // the node still advertises itself so it can be commissioned
    assert_eq!(boot.responder.published().services.len(), 1);
}

#[test]
fn test_console_provisioning() {
    let hex = OperationalDataset::new_random().to_tlvs().unwrap().to_hex();
    let script = format!("dataset set active {}\nifconfig up\nthread start\n", hex);
    let console = Console::default();

    let mut config = Config::test_mode();
    config.thread.cli_enabled = true;
    let store = share(MemoryStore::new());
    let stack =
        SimulatedThreadStack::new(store.clone()).with_console(Cursor::new(script), console.clone());
    let mut boot = boot_with(config, store.clone(), ScriptedBackbone::connecting(IP), stack);

    let mesh = boot.router.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        boot.probe.role() == DeviceRole::Leader
    }));
    boot.probe.stop();
    assert_eq!(mesh.join().unwrap(), DatasetSource::Unprovisioned);

    let output = console.text();
    assert_eq!(output.matches("Done").count(), 3, "console output: {}", output);
    assert!(lock_store(&store)
        .unwrap()
        .get(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY)
        .unwrap()
        .is_some());
    assert!(boot.probe.calls().contains(&"cli_create_task"));
}

#[test]
fn test_backbone_retries_then_connects() {
    let backbone = ScriptedBackbone::new([None, None, Some(IP)]);
    let store = share(MemoryStore::new());
    let stack = SimulatedThreadStack::new(store.clone());
    let mut boot = boot_with(Config::test_mode(), store, backbone.clone(), stack);

    run_to_mainloop(&mut boot);
    assert_eq!(backbone.attempts(), 3);
    let monitor = boot.router.monitor().unwrap();
    assert!(monitor.is_connected());
    assert_eq!(monitor.retry_count(), 0);
    assert_eq!(boot.router.interface().unwrap().ip, IP);
    assert!(!boot.platform.calls().contains(&PlatformCall::Restart));
}

#[test]
fn test_backbone_gives_up_and_reboots() {
    let backbone = ScriptedBackbone::unreachable();
    let store = share(MemoryStore::new());
    let stack = SimulatedThreadStack::new(store.clone());
    let mut boot = boot_with(Config::test_mode(), store, backbone.clone(), stack);

    let err = boot.router.start().err().unwrap();
    assert_eq!(err.code(), "E_WIFI_RETRIES");
    // first attempt plus three retries
    assert_eq!(backbone.attempts(), 4);
    let calls = boot.platform.calls();
    assert_eq!(calls.last(), Some(&PlatformCall::Restart));
    assert!(calls.contains(&PlatformCall::Delay(Duration::from_millis(10))));
    assert!(boot.probe.calls().is_empty());
}

#[test]
fn test_full_storage_is_erased_at_boot() {
    let saved = OperationalDataset::new_random().to_tlvs().unwrap();
    let mut memory = MemoryStore::new();
    memory.set_unchecked(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY, saved.as_bytes().to_vec());
    memory.fail_next_init(StorageError::NoFreePages);
    let store = share(memory);

    let mut boot = boot(Config::test_mode(), store);
    // erased along with the rest of the store
    assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Unprovisioned);
}

#[test]
fn test_unusable_storage_is_fatal() {
    let mut memory = MemoryStore::new();
    memory.fail_next_init(StorageError::Backend("flash read error".to_string()));
    let mut boot = boot(Config::test_mode(), share(memory));

    let err = boot.router.start().err().unwrap();
    assert!(err.is_fatal());
    assert!(boot.platform.calls().is_empty());
}

#[test]
fn test_meshcop_advertisement() {
    let mut config = Config::test_mode();
    config.device.name = "otbr-garage".to_string();
    config.mdns.instance_name = Some("Garage Border Router".to_string());

    let mut boot = boot(config, share(MemoryStore::new()));
    run_to_mainloop(&mut boot);

    let published = boot.responder.published();
    assert_eq!(published.hostname.as_deref(), Some("otbr-garage"));
    assert_eq!(published.instance_name.as_deref(), Some("Garage Border Router"));
    let (service, iface) = &published.services[0];
    assert_eq!(service.full_name(), "otbr-garage._meshcop._udp.local.");
    assert_eq!(service.port, 49191);
    assert_eq!(service.txt_value("rv"), Some("1"));
    assert_eq!(service.txt_value("dd"), Some("otbr-garage"));
    assert_eq!(iface.ip, IP);
    assert_eq!(boot.router.service(), Some(service));
}

#[test]
#[cfg(feature = "sqlite")]
fn test_sqlite_settings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::test_mode();
    config.thread.auto_start = true;
    config.storage.backend = StorageBackendType::Sqlite;
    config.storage.path = dir.path().join("nvs.db").to_string_lossy().into_owned();

    let first_key = {
        let mut boot = boot(config.clone(), open_store(&config.storage).unwrap());
        assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Created);
        boot.probe.active_dataset().unwrap().network_key
    };

    let mut boot = boot(config.clone(), open_store(&config.storage).unwrap());
    assert_eq!(run_to_mainloop(&mut boot), DatasetSource::Saved);
    assert_eq!(boot.probe.active_dataset().unwrap().network_key, first_key);
}
