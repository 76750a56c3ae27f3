//! The [`BorderRouter`] startup sequence and mesh task.
//!
//! Startup runs on the caller's thread in a fixed order:
//!
//! 1. persistent storage (erased and retried once if unusable)
//! 2. event-fd registration for the Thread stack
//! 3. Wi-Fi backbone; the device reboots if it cannot connect
//! 4. `_meshcop._udp` advertisement
//! 5. the `ot_main` task, which runs [`run_mesh_task`]
//!
//! # Examples
//!
//! ```no_run
//! # use otbr_node::{BorderRouter, Components, Config, HostPlatform, MemoryStore, RecordingResponder,
//! #     ScriptedBackbone, SimulatedThreadStack, share};
//! # use std::sync::Arc;
//! # fn main() -> otbr_node::Result<()> {
//! let store = share(MemoryStore::new());
//! let components = Components {
//!     store: store.clone(),
//!     backbone: Box::new(ScriptedBackbone::connecting([192, 168, 1, 20].into())),
//!     responder: Box::new(RecordingResponder::new()),
//!     platform: Arc::new(HostPlatform::new()),
//!     stack: SimulatedThreadStack::new(store),
//! };
//! let mut router = BorderRouter::new(Config::test_mode(), components)?;
//! let mesh = router.start()?;
//! mesh.join()?;
//! # Ok(())
//! # }
//! ```

use crate::backbone::{bring_up_backbone, BackboneDriver, BackboneInterface, ConnectionMonitor};
use crate::config::Config;
use crate::discovery::{start_discovery, MeshcopService, ServiceResponder};
use crate::error::{Error, Result, ThreadError};
use crate::logging::{set_tag, tag};
use crate::platform::{Platform, TaskSpec};
use crate::provisioning::{acquire_dataset, bring_up_mesh, DatasetSource};
use crate::storage_trait::{init_persistent_storage, lock_store, SharedStore};
use crate::thread::{log_state_change, OtPlatformConfig, ThreadStack};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Name of the mesh task.
pub const MESH_TASK_NAME: &str = "ot_main";

/// Everything the border router drives. Backends are chosen by the binary.
pub struct Components<S: ThreadStack> {
    pub store: SharedStore,
    pub backbone: Box<dyn BackboneDriver>,
    pub responder: Box<dyn ServiceResponder>,
    pub platform: Arc<dyn Platform>,
    pub stack: S,
}

type MeshResult = Arc<Mutex<Option<Result<DatasetSource>>>>;

/// Handle to the running mesh task.
pub struct MeshTaskHandle {
    handle: JoinHandle<()>,
    result: MeshResult,
}

impl MeshTaskHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the mesh task. In normal operation it never ends.
    ///
    /// Returns where the dataset came from, or the error that stopped the task.
    pub fn join(self) -> Result<DatasetSource> {
        self.handle
            .join()
            .map_err(|_| Error::Internal("mesh task panicked".to_string()))?;
        self.result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(|| Err(Error::Internal("mesh task left no result".to_string())))
    }
}

/// A standalone Thread border router.
pub struct BorderRouter<S: ThreadStack + 'static> {
    config: Config,
    store: SharedStore,
    backbone: Box<dyn BackboneDriver>,
    responder: Box<dyn ServiceResponder>,
    platform: Arc<dyn Platform>,
    stack: Option<S>,
    monitor: Option<Arc<ConnectionMonitor>>,
    interface: Option<BackboneInterface>,
    service: Option<MeshcopService>,
}

impl<S: ThreadStack + 'static> BorderRouter<S> {
    /// Validates the configuration and takes ownership of the components.
    pub fn new(config: Config, components: Components<S>) -> Result<Self> {
        config.validate()?;
        set_tag(&config.device.name);
        Ok(Self {
            config,
            store: components.store,
            backbone: components.backbone,
            responder: components.responder,
            platform: components.platform,
            stack: Some(components.stack),
            monitor: None,
            interface: None,
            service: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Station state, once the backbone is up.
    pub fn monitor(&self) -> Option<&Arc<ConnectionMonitor>> {
        self.monitor.as_ref()
    }

    pub fn interface(&self) -> Option<&BackboneInterface> {
        self.interface.as_ref()
    }

    /// The published advertisement, once discovery is up.
    pub fn service(&self) -> Option<&MeshcopService> {
        self.service.as_ref()
    }

    /// Runs the startup sequence and launches the mesh task.
    ///
    /// Storage and platform failures are fatal and returned as is. When the
    /// backbone gives up, the device waits `wifi.reboot_delay` and restarts;
    /// on platforms where restart returns, the backbone error is returned.
    pub fn start(&mut self) -> Result<MeshTaskHandle> {
        let name = self.config.device.name.clone();
        log::info!(target: tag(), "========================================");
        log::info!(target: tag(), "  ESP32-C6 OpenThread Border Router");
        log::info!(target: tag(), "  Device: {}", name);
        log::info!(target: tag(), "========================================");

        let stack = self
            .stack
            .take()
            .ok_or_else(|| ThreadError::InvalidState("border router already started".to_string()))?;

        {
            let mut store = lock_store(&self.store)?;
            init_persistent_storage(&mut *store)?;
            log::info!(target: tag(), "Persistent storage ready ({})", store.backend_name());
        }

        self.platform
            .register_eventfd(self.config.platform.eventfd_max_fds)?;

        let (iface, monitor) = match bring_up_backbone(self.backbone.as_mut(), &self.config.wifi) {
            Ok(up) => up,
            Err(e) if e.requires_restart() => {
                log::error!(
                    target: tag(),
                    "Wi-Fi failed, rebooting in {}s",
                    self.config.wifi.reboot_delay.as_secs_f32()
                );
                self.platform.delay(self.config.wifi.reboot_delay);
                self.platform.restart();
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.monitor = Some(monitor);
        self.interface = Some(iface.clone());

        let service = start_discovery(self.responder.as_mut(), &self.config, &iface)?;
        self.service = Some(service);

        let handle = self.spawn_mesh_task(stack, iface)?;

        log::info!(target: tag(), "OTBR startup complete, {} is online", name);
        Ok(handle)
    }

    fn spawn_mesh_task(&self, mut stack: S, iface: BackboneInterface) -> Result<MeshTaskHandle> {
        let spec = TaskSpec {
            name: MESH_TASK_NAME.to_string(),
            stack_size: self.config.platform.task_stack_size,
            priority: self.config.platform.task_priority,
        };

        let result: MeshResult = Arc::new(Mutex::new(None));
        let slot = result.clone();
        let config = self.config.clone();
        let platform = self.platform.clone();

        let handle = self.platform.spawn_task(
            &spec,
            Box::new(move || {
                let outcome = run_mesh_task(&mut stack, &config, &iface, platform.as_ref());
                if let Err(e) = &outcome {
                    log::error!(target: tag(), "Mesh task stopped: {}", e);
                }
                *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
            }),
        )?;

        Ok(MeshTaskHandle { handle, result })
    }
}

/// Body of the mesh task: brings up the Thread stack, applies a dataset and
/// runs the stack's main loop.
///
/// Returns once the main loop exits, after tearing down the netif glue and
/// the event-fd registration.
pub fn run_mesh_task<S: ThreadStack>(
    stack: &mut S,
    config: &Config,
    backbone: &BackboneInterface,
    platform: &dyn Platform,
) -> Result<DatasetSource> {
    let cli = config.thread.cli_enabled;

    stack.init(&OtPlatformConfig::native(cli))?;
    stack.set_state_changed_callback(Box::new(|flags, role| {
        log_state_change(flags, role);
    }))?;

    if cli {
        stack.cli_init()?;
    }

    stack.border_router_init(backbone)?;
    log::info!(target: tag(), "OpenThread Border Router initialized");

    let source = stack.with_lock(|instance| {
        let source = acquire_dataset(instance, &config.thread);
        if let Err(e) = bring_up_mesh(instance, source) {
            log::error!(target: tag(), "Failed to enable Thread: {}", e);
        }
        source
    })?;

    if cli {
        stack.cli_create_task()?;
    }

    let exit = stack.launch_mainloop();
    log::warn!(target: tag(), "Thread main loop exited");

    stack.deinit();
    if let Err(e) = platform.unregister_eventfd() {
        log::warn!(target: tag(), "eventfd unregister failed: {}", e);
    }

    match exit {
        Ok(()) => Ok(source),
        Err(e) => Err(ThreadError::MainloopExited(e.to_string()).into()),
    }
}
