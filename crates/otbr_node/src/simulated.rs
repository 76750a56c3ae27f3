//! In-process Thread stack
//!
//! Stands in for OpenThread on hosts without an 802.15.4 radio. It keeps the
//! parts of the stack the border router observes: the active dataset is
//! persisted in the key-value store like the real settings layer does, the
//! role moves `disabled -> detached -> leader` once IPv6 and Thread are both
//! enabled with a dataset, state-change callbacks fire, and the main loop
//! serves the provisioning console.

use crate::backbone::BackboneInterface;
use crate::cli::Cli;
use crate::dataset::{DatasetTlvs, OperationalDataset};
use crate::error::{DatasetError, Error, Result, ThreadError};
use crate::storage_trait::{lock_store, SharedStore};
use crate::thread::{
    ot_error, ChangedFlags, DeviceRole, OtPlatformConfig, StateChangedCallback, ThreadInstance,
    ThreadStack,
};
use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Settings namespace of the stack.
pub const SETTINGS_NAMESPACE: &str = "openthread";

/// Settings key of the active dataset.
pub const ACTIVE_DATASET_KEY: &str = "active_ds";

/// State behind the simulated stack lock.
pub struct SimulatedInstance {
    store: SharedStore,
    initialized: bool,
    active: Option<OperationalDataset>,
    ip6_enabled: bool,
    thread_enabled: bool,
    role: DeviceRole,
    callback: Option<StateChangedCallback>,
    fail_create: bool,
    fail_init: bool,
    /// Saved dataset the decoder cannot read. The stack still attaches with it.
    undecoded: Option<DatasetError>,
}

impl SimulatedInstance {
    fn new(store: SharedStore) -> Self {
        Self {
            store,
            initialized: false,
            active: None,
            ip6_enabled: false,
            thread_enabled: false,
            role: DeviceRole::Disabled,
            callback: None,
            fail_create: false,
            fail_init: false,
            undecoded: None,
        }
    }

    fn load(&mut self) -> Result<()> {
        let saved = lock_store(&self.store)?.get(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY)?;
        self.active = None;
        self.undecoded = None;
        if let Some(bytes) = saved {
            match OperationalDataset::from_tlv_bytes(&bytes) {
                Ok(dataset) => self.active = Some(dataset),
                Err(e) => self.undecoded = Some(e),
            }
        }
        Ok(())
    }

    fn notify(&self, flags: ChangedFlags) {
        if let Some(callback) = &self.callback {
            callback(flags, self.role);
        }
    }

    fn set_role(&mut self, role: DeviceRole, extra: ChangedFlags) {
        if self.role != role {
            self.role = role;
            self.notify(ChangedFlags::THREAD_ROLE | extra);
        }
    }

    /// Applies the attach rules after any change to interfaces or dataset.
    fn update_role(&mut self) {
        if !self.thread_enabled {
            self.set_role(DeviceRole::Disabled, ChangedFlags::empty());
            return;
        }
        if !self.has_dataset() || !self.ip6_enabled {
            self.set_role(DeviceRole::Detached, ChangedFlags::empty());
            return;
        }
        if self.role != DeviceRole::Leader {
            self.set_role(DeviceRole::Detached, ChangedFlags::empty());
            // no other partition to attach to: become leader of a new one
            self.set_role(
                DeviceRole::Leader,
                ChangedFlags::THREAD_PARTITION_ID | ChangedFlags::THREAD_NETDATA,
            );
        }
    }

    fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(ThreadError::NotInitialized.into())
        }
    }

    fn thread_enabled(&self) -> bool {
        self.thread_enabled
    }

    fn has_dataset(&self) -> bool {
        self.active.is_some() || self.undecoded.is_some()
    }
}

impl ThreadInstance for SimulatedInstance {
    fn active_dataset(&self) -> Result<OperationalDataset> {
        self.ensure_init()?;
        match (&self.active, &self.undecoded) {
            (Some(dataset), _) => Ok(dataset.clone()),
            (None, Some(e)) => Err(e.clone().into()),
            (None, None) => Err(ThreadError::NotFound.into()),
        }
    }

    fn set_active_dataset(&mut self, dataset: &OperationalDataset) -> Result<()> {
        self.ensure_init()?;
        dataset.validate_active()?;
        let tlvs = dataset.to_tlvs()?;
        lock_store(&self.store)?.set(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY, tlvs.as_bytes())?;

        self.active = Some(dataset.clone());
        self.undecoded = None;
        self.notify(ChangedFlags::ACTIVE_DATASET);
        if self.thread_enabled {
            // new credentials: re-attach
            self.set_role(DeviceRole::Detached, ChangedFlags::empty());
            self.update_role();
        }
        Ok(())
    }

    fn set_active_tlvs(&mut self, tlvs: &DatasetTlvs) -> Result<()> {
        let dataset = tlvs.decode()?;
        self.set_active_dataset(&dataset)
    }

    fn create_new_network(&mut self) -> Result<OperationalDataset> {
        self.ensure_init()?;
        if self.fail_create {
            return Err(ThreadError::Rejected {
                op: "create new network",
                code: ot_error::FAILED,
            }
            .into());
        }
        Ok(OperationalDataset::new_random())
    }

    fn set_ip6_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_init()?;
        if !enabled && self.thread_enabled {
            return Err(ThreadError::InvalidState("Thread is running".to_string()).into());
        }
        self.ip6_enabled = enabled;
        self.update_role();
        Ok(())
    }

    fn ip6_enabled(&self) -> bool {
        self.ip6_enabled
    }

    fn set_thread_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_init()?;
        if enabled {
            if !self.ip6_enabled {
                return Err(ThreadError::InvalidState("IPv6 interface is down".to_string()).into());
            }
            if !self.has_dataset() {
                return Err(ThreadError::InvalidState("no active dataset".to_string()).into());
            }
        }
        self.thread_enabled = enabled;
        self.update_role();
        Ok(())
    }

    fn device_role(&self) -> DeviceRole {
        self.role
    }
}

enum LoopMessage {
    Command(String),
    Stop,
}

/// Stops a running [`SimulatedThreadStack`] main loop from another thread.
#[derive(Clone)]
pub struct StopHandle {
    tx: Sender<LoopMessage>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(LoopMessage::Stop);
    }
}

/// Read-only view of a simulated stack, usable after the stack has moved
/// into the mesh task.
#[derive(Clone)]
pub struct SimulatedProbe {
    instance: Arc<Mutex<SimulatedInstance>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    stop: StopHandle,
}

impl SimulatedProbe {
    fn instance(&self) -> MutexGuard<'_, SimulatedInstance> {
        self.instance.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn role(&self) -> DeviceRole {
        self.instance().role
    }

    pub fn active_dataset(&self) -> Option<OperationalDataset> {
        self.instance().active.clone()
    }

    pub fn ip6_enabled(&self) -> bool {
        self.instance().ip6_enabled
    }

    pub fn thread_enabled(&self) -> bool {
        self.instance().thread_enabled()
    }

    /// Stack calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Polls until `call` has been made or `timeout` elapses.
    pub fn wait_for_call(&self, call: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.calls().contains(&call) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn stop(&self) {
        self.stop.stop();
    }
}

type Console = (Box<dyn BufRead + Send>, Box<dyn Write + Send>);

/// Simulated [`ThreadStack`].
pub struct SimulatedThreadStack {
    instance: Arc<Mutex<SimulatedInstance>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
    console: Option<Console>,
    output: Arc<Mutex<Box<dyn Write + Send>>>,
    tx: Sender<LoopMessage>,
    rx: Option<Receiver<LoopMessage>>,
    cli_enabled: bool,
}

impl SimulatedThreadStack {
    /// A stack whose settings live in `store`. The console reads stdin.
    pub fn new(store: SharedStore) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            instance: Arc::new(Mutex::new(SimulatedInstance::new(store))),
            calls: Arc::new(Mutex::new(Vec::new())),
            console: None,
            output: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
            tx,
            rx: Some(rx),
            cli_enabled: false,
        }
    }

    /// Serves the console on `input`/`output` instead of stdin/stdout.
    pub fn with_console(
        mut self,
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        self.console = Some((Box::new(input), Box::new(output)));
        self
    }

    /// Makes `create_new_network` fail.
    pub fn fail_create_new_network(self) -> Self {
        self.lock().fail_create = true;
        self
    }

    /// Makes `init` fail as if the radio could not be brought up.
    pub fn fail_init(self) -> Self {
        self.lock().fail_init = true;
        self
    }

    pub fn probe(&self) -> SimulatedProbe {
        SimulatedProbe {
            instance: self.instance.clone(),
            calls: self.calls.clone(),
            stop: self.stop_handle(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.tx.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedInstance> {
        self.instance.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn print(&self, lines: &[String]) {
        let mut out = self.output.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            let _ = writeln!(out, "{}", line);
        }
        let _ = out.flush();
    }
}

impl ThreadStack for SimulatedThreadStack {
    type Instance = SimulatedInstance;

    fn init(&mut self, config: &OtPlatformConfig) -> Result<()> {
        self.record("init");
        let mut instance = self.lock();
        if instance.fail_init {
            return Err(ThreadError::InitFailed("radio not responding".to_string()).into());
        }
        instance
            .load()
            .map_err(|e| ThreadError::InitFailed(e.to_string()))?;
        instance.initialized = true;
        log::debug!(
            "Simulated Thread stack up ({:?} radio, settings in '{}')",
            config.radio_mode,
            config.storage_partition
        );
        Ok(())
    }

    fn set_state_changed_callback(&mut self, callback: StateChangedCallback) -> Result<()> {
        self.record("set_state_changed_callback");
        let mut instance = self.lock();
        instance.ensure_init()?;
        instance.callback = Some(callback);
        Ok(())
    }

    fn cli_init(&mut self) -> Result<()> {
        self.record("cli_init");
        self.lock().ensure_init()?;
        self.cli_enabled = true;
        Ok(())
    }

    fn border_router_init(&mut self, backbone: &BackboneInterface) -> Result<()> {
        self.record("border_router_init");
        self.lock()
            .ensure_init()
            .map_err(|e| ThreadError::BorderRouter(e.to_string()))?;
        log::debug!("Backbone interface {} ({})", backbone.name, backbone.ip);
        Ok(())
    }

    fn with_lock<R>(&self, f: impl FnOnce(&mut Self::Instance) -> R) -> Result<R> {
        let mut instance = self.lock();
        instance.ensure_init()?;
        Ok(f(&mut *instance))
    }

    fn cli_create_task(&mut self) -> Result<()> {
        self.record("cli_create_task");
        if !self.cli_enabled {
            return Ok(());
        }

        let (input, output): Console = match self.console.take() {
            Some(console) => console,
            None => (
                Box::new(std::io::BufReader::new(std::io::stdin())),
                Box::new(std::io::stdout()),
            ),
        };
        *self.output.lock().unwrap_or_else(|e| e.into_inner()) = output;

        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name("ot_cli".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(LoopMessage::Command(line)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| Error::platform(format!("CLI task spawn failed: {}", e)))?;
        Ok(())
    }

    fn launch_mainloop(&mut self) -> Result<()> {
        self.record("launch_mainloop");
        let rx = self
            .rx
            .take()
            .ok_or_else(|| ThreadError::InvalidState("main loop already ran".to_string()))?;

        let mut cli = Cli::new();
        for message in rx.iter() {
            match message {
                LoopMessage::Command(line) => {
                    let lines = self.with_lock(|instance| cli.execute(instance, &line))?;
                    self.print(&lines);
                }
                LoopMessage::Stop => break,
            }
        }
        Ok(())
    }

    fn deinit(&mut self) {
        self.record("deinit");
        let mut instance = self.lock();
        instance.initialized = false;
        instance.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::storage_trait::{init_persistent_storage, share};

    fn store() -> SharedStore {
        let store = share(MemoryStore::new());
        init_persistent_storage(&mut *lock_store(&store).unwrap()).unwrap();
        store
    }

    fn started(store: SharedStore) -> SimulatedThreadStack {
        let mut stack = SimulatedThreadStack::new(store);
        stack.init(&OtPlatformConfig::native(false)).unwrap();
        stack
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lock_requires_init() {
        let stack = SimulatedThreadStack::new(store());
        let err = stack.with_lock(|_| ()).unwrap_err();
        assert_eq!(err.code(), "E_OT_NOT_INIT");
    }

    #[test]
    fn test_dataset_survives_reboot() {
        let store = store();
        let dataset = OperationalDataset::new_random();
        {
            let stack = started(store.clone());
            stack
                .with_lock(|i| i.set_active_dataset(&dataset))
                .unwrap()
                .unwrap();
        }

        let stack = started(store.clone());
        let saved = stack.with_lock(|i| i.active_dataset()).unwrap().unwrap();
        assert_eq!(saved.network_key, dataset.network_key);
        assert!(lock_store(&store)
            .unwrap()
            .get(SETTINGS_NAMESPACE, ACTIVE_DATASET_KEY)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_no_dataset_is_not_found() {
        let stack = started(store());
        let err = stack.with_lock(|i| i.active_dataset()).unwrap().unwrap_err();
        assert_eq!(err.code(), "E_OT_NOT_FOUND");
    }

    #[test]
    fn test_incomplete_dataset_rejected() {
        let stack = started(store());
        let mut dataset = OperationalDataset::new_random();
        dataset.network_key = None;
        let err = stack
            .with_lock(|i| i.set_active_dataset(&dataset))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), "E_DATASET");
        assert!(stack.probe().active_dataset().is_none());
    }

    #[test]
    fn test_role_progression_and_callbacks() {
        let mut stack = started(store());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stack
            .set_state_changed_callback(Box::new(move |flags, role| {
                sink.lock().unwrap().push((flags, role));
            }))
            .unwrap();

        stack
            .with_lock(|i| -> Result<()> {
                i.set_active_dataset(&OperationalDataset::new_random())?;
                i.set_ip6_enabled(true)?;
                i.set_thread_enabled(true)
            })
            .unwrap()
            .unwrap();

        let roles: Vec<DeviceRole> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(flags, _)| flags.contains(ChangedFlags::THREAD_ROLE))
            .map(|(_, role)| *role)
            .collect();
        assert_eq!(roles, [DeviceRole::Detached, DeviceRole::Leader]);
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|(flags, _)| flags.contains(ChangedFlags::THREAD_NETDATA)));

        stack.with_lock(|i| i.set_thread_enabled(false)).unwrap().unwrap();
        assert_eq!(stack.probe().role(), DeviceRole::Disabled);
    }

    #[test]
    fn test_create_failure_injection() {
        let stack = SimulatedThreadStack::new(store()).fail_create_new_network();
        let mut stack = stack;
        stack.init(&OtPlatformConfig::native(false)).unwrap();
        let err = stack
            .with_lock(|i| i.create_new_network())
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), "E_OT_REJECTED");
    }

    #[test]
    fn test_mainloop_serves_console() {
        let output = Buffer::default();
        let input = std::io::Cursor::new(b"state\nfrobnicate\n".to_vec());
        let mut stack = started(store()).with_console(input, output.clone());
        let probe = stack.probe();
        stack.cli_init().unwrap();
        stack.cli_create_task().unwrap();

        let handle = std::thread::spawn(move || {
            stack.launch_mainloop().unwrap();
            stack.deinit();
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while String::from_utf8_lossy(&output.0.lock().unwrap()).lines().count() < 3
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        probe.stop();
        handle.join().unwrap();

        let text = String::from_utf8(output.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "disabled\nDone\nError 35: InvalidCommand\n");
        assert_eq!(
            probe.calls(),
            ["init", "cli_init", "cli_create_task", "launch_mainloop", "deinit"]
        );
    }
}
