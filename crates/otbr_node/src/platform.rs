//! Platform services used by the startup sequence
//!
//! Event file descriptors for the Thread stack, delays, restarts and task
//! creation differ between FreeRTOS and a host OS; [`Platform`] hides the
//! difference.

use crate::error::{Error, Result};
use crate::logging::tag;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

/// Exit status [`HostPlatform::restart`] uses, so a supervisor
/// (systemd `Restart=on-failure`, a shell loop) can start the node again.
pub const RESTART_EXIT_CODE: i32 = 75;

/// A task to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub stack_size: usize,
    pub priority: u8,
}

/// Things the firmware asks of the operating system.
pub trait Platform: Send + Sync {
    /// Registers the event-fd driver the Thread stack polls on.
    fn register_eventfd(&self, max_fds: usize) -> Result<()>;

    fn unregister_eventfd(&self) -> Result<()>;

    fn delay(&self, duration: Duration);

    /// Reboots the device. On real hardware this does not return.
    fn restart(&self);

    /// Spawns `f` as a task.
    fn spawn_task(&self, spec: &TaskSpec, f: Box<dyn FnOnce() + Send>) -> Result<JoinHandle<()>>;

    /// Platform name for logs
    fn name(&self) -> &'static str;
}

/// Platform for hosts: std threads, process exit as restart.
#[derive(Debug, Default)]
pub struct HostPlatform {
    eventfds: Mutex<Option<usize>>,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for HostPlatform {
    fn register_eventfd(&self, max_fds: usize) -> Result<()> {
        let mut eventfds = self.eventfds.lock().unwrap_or_else(|e| e.into_inner());
        if eventfds.is_some() {
            return Err(Error::platform("eventfd already registered"));
        }
        if max_fds == 0 {
            return Err(Error::platform("eventfd max_fds must be at least 1"));
        }
        *eventfds = Some(max_fds);
        log::debug!(target: tag(), "eventfd registered (max {} fds)", max_fds);
        Ok(())
    }

    fn unregister_eventfd(&self) -> Result<()> {
        self.eventfds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::platform("eventfd not registered"))
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn restart(&self) {
        log::warn!(target: tag(), "Restarting (exit status {})", RESTART_EXIT_CODE);
        log::logger().flush();
        std::process::exit(RESTART_EXIT_CODE);
    }

    fn spawn_task(&self, spec: &TaskSpec, f: Box<dyn FnOnce() + Send>) -> Result<JoinHandle<()>> {
        log::debug!(
            target: tag(),
            "Spawning task {} (stack {} bytes, priority {})",
            spec.name,
            spec.stack_size,
            spec.priority
        );
        // host threads need far more stack than the device budget
        let stack_size = spec.stack_size.max(2 * 1024 * 1024);
        std::thread::Builder::new()
            .name(spec.name.clone())
            .stack_size(stack_size)
            .spawn(f)
            .map_err(|e| Error::platform(format!("failed to spawn {}: {}", spec.name, e)))
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

/// Calls observed by a [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    RegisterEventfd(usize),
    UnregisterEventfd,
    Delay(Duration),
    Restart,
    Spawn(TaskSpec),
}

/// Platform that records calls. Delays do not sleep and restarts return.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    fail_eventfd: bool,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose event-fd registration fails.
    pub fn failing_eventfd() -> Self {
        Self {
            fail_eventfd: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, call: PlatformCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl Platform for RecordingPlatform {
    fn register_eventfd(&self, max_fds: usize) -> Result<()> {
        self.push(PlatformCall::RegisterEventfd(max_fds));
        if self.fail_eventfd {
            return Err(Error::platform("eventfd registration failed"));
        }
        Ok(())
    }

    fn unregister_eventfd(&self) -> Result<()> {
        self.push(PlatformCall::UnregisterEventfd);
        Ok(())
    }

    fn delay(&self, duration: Duration) {
        self.push(PlatformCall::Delay(duration));
    }

    fn restart(&self) {
        self.push(PlatformCall::Restart);
    }

    fn spawn_task(&self, spec: &TaskSpec, f: Box<dyn FnOnce() + Send>) -> Result<JoinHandle<()>> {
        self.push(PlatformCall::Spawn(spec.clone()));
        std::thread::Builder::new()
            .name(spec.name.clone())
            .spawn(f)
            .map_err(|e| Error::platform(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
