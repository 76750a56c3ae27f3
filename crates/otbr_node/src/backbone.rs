//! Wi-Fi backbone bring-up
//!
//! The border router reaches the home network through a Wi-Fi station.
//! Station events (started, disconnected, got an address) are delivered on
//! an event context owned by the driver and fed into a [`ConnectionMonitor`],
//! which decides whether to reconnect and raises one of two flags:
//!
//! - [`CONNECTED_BIT`] once an IPv4 address is assigned
//! - [`FAIL_BIT`] once the retry budget is spent
//!
//! [`bring_up_backbone`] blocks the startup sequence until either flag is set.

use crate::config::{AuthThreshold, WifiConfig};
use crate::error::{BackboneError, Error, Result};
use crate::logging::tag;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Station received an address.
pub const CONNECTED_BIT: u32 = 1 << 0;
/// Station gave up reconnecting.
pub const FAIL_BIT: u32 = 1 << 1;

/// 802.11 disconnect reason: no access point with the SSID was found.
pub const REASON_NO_AP_FOUND: u16 = 201;
/// 802.11 disconnect reason: authentication failed.
pub const REASON_AUTH_FAIL: u16 = 202;

/// Station events the monitor reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackboneEvent {
    /// Station interface started
    StaStart,
    /// Association lost or failed
    StaDisconnected { reason: u16 },
    /// DHCP assigned an address
    GotIp { ip: Ipv4Addr },
}

/// What the event context should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Request (re)association
    Connect,
    /// Nothing
    None,
}

/// Group of bits that tasks can block on.
///
/// Waiting does not clear bits; once set they stay set until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: Mutex<u32>,
    cond: Condvar,
}

impl EventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets bits and wakes waiters.
    pub fn set(&self, bits: u32) {
        let mut current = self.bits.lock().unwrap_or_else(|e| e.into_inner());
        *current |= bits;
        self.cond.notify_all();
    }

    pub fn clear(&self, bits: u32) {
        let mut current = self.bits.lock().unwrap_or_else(|e| e.into_inner());
        *current &= !bits;
    }

    pub fn bits(&self) -> u32 {
        *self.bits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until any bit in `mask` is set, or until `timeout` elapses.
    ///
    /// Returns the full bit set at wake-up. On timeout the returned value
    /// has no bit of `mask` set.
    pub fn wait_any(&self, mask: u32, timeout: Option<Duration>) -> u32 {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut current = self.bits.lock().unwrap_or_else(|e| e.into_inner());
        while *current & mask == 0 {
            match deadline {
                None => {
                    current = self.cond.wait(current).unwrap_or_else(|e| e.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    current = self
                        .cond
                        .wait_timeout(current, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
            }
        }
        *current
    }
}

/// Reconnect policy and outcome signalling for the station.
#[derive(Debug)]
pub struct ConnectionMonitor {
    max_retry: u32,
    retries: AtomicU32,
    flags: Arc<EventFlags>,
    ip: Mutex<Option<Ipv4Addr>>,
}

impl ConnectionMonitor {
    /// `max_retry == 0` retries forever.
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            retries: AtomicU32::new(0),
            flags: Arc::new(EventFlags::new()),
            ip: Mutex::new(None),
        }
    }

    pub fn flags(&self) -> &Arc<EventFlags> {
        &self.flags
    }

    /// Reconnects since the last successful connection.
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Address from the most recent `GotIp`.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        *self.ip.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.flags.bits() & CONNECTED_BIT != 0
    }

    pub fn has_failed(&self) -> bool {
        self.flags.bits() & FAIL_BIT != 0
    }

    /// Applies the reconnect policy to one station event.
    pub fn handle_event(&self, event: &BackboneEvent) -> EventAction {
        match event {
            BackboneEvent::StaStart => EventAction::Connect,
            BackboneEvent::StaDisconnected { reason } => {
                let retries = self.retries.load(Ordering::SeqCst);
                if self.max_retry == 0 || retries < self.max_retry {
                    let attempt = self.retries.fetch_add(1, Ordering::SeqCst) + 1;
                    if self.max_retry == 0 {
                        log::info!(
                            target: tag(),
                            "Wi-Fi disconnected (reason {}), retry {}",
                            reason,
                            attempt
                        );
                    } else {
                        log::info!(
                            target: tag(),
                            "Wi-Fi disconnected (reason {}), retry {}/{}",
                            reason,
                            attempt,
                            self.max_retry
                        );
                    }
                    EventAction::Connect
                } else {
                    log::warn!(target: tag(), "Wi-Fi connection failed after {} retries", retries);
                    self.flags.set(FAIL_BIT);
                    EventAction::None
                }
            }
            BackboneEvent::GotIp { ip } => {
                log::info!(target: tag(), "Wi-Fi connected, IP: {}", ip);
                *self.ip.lock().unwrap_or_else(|e| e.into_inner()) = Some(*ip);
                self.retries.store(0, Ordering::SeqCst);
                self.flags.set(CONNECTED_BIT);
                EventAction::None
            }
        }
    }
}

/// Station credentials handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaConfig {
    pub ssid: String,
    pub password: String,
    pub auth_threshold: AuthThreshold,
}

impl StaConfig {
    pub fn from_wifi(config: &WifiConfig) -> Self {
        Self {
            ssid: config.ssid.clone(),
            password: config.password.clone(),
            auth_threshold: config.auth_threshold,
        }
    }
}

/// The backbone network interface handed to the border router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneInterface {
    /// Interface name (`sta0`, `wlan0`, ...)
    pub name: String,
    pub ip: Ipv4Addr,
}

/// A Wi-Fi station driver.
pub trait BackboneDriver: Send {
    /// Applies station credentials. Called once, before `start`.
    fn configure(&mut self, sta: &StaConfig) -> Result<()>;

    /// Starts the station. From here on every station event must be passed
    /// to `monitor`, beginning with [`BackboneEvent::StaStart`], and a
    /// [`EventAction::Connect`] answer must lead to a `connect`.
    fn start(&mut self, monitor: Arc<ConnectionMonitor>) -> Result<()>;

    /// Requests association with the configured access point.
    fn connect(&self) -> Result<()>;

    /// The connected interface, once an address is assigned.
    fn interface(&self) -> Option<BackboneInterface>;

    /// Driver name for logs
    fn name(&self) -> &'static str;
}

/// Brings the backbone up and blocks until it is connected or has given up.
///
/// Returns [`BackboneError::RetriesExhausted`] when the retry budget runs
/// out; the caller is expected to wait and restart the device.
pub fn bring_up_backbone(
    driver: &mut dyn BackboneDriver,
    config: &WifiConfig,
) -> Result<(BackboneInterface, Arc<ConnectionMonitor>)> {
    let sta = StaConfig::from_wifi(config);
    driver.configure(&sta)?;

    let monitor = Arc::new(ConnectionMonitor::new(config.max_retry));
    driver.start(monitor.clone())?;
    log::info!(target: tag(), "Wi-Fi STA started, connecting to '{}'", sta.ssid);

    let bits = monitor
        .flags()
        .wait_any(CONNECTED_BIT | FAIL_BIT, None);

    if bits & CONNECTED_BIT != 0 {
        let iface = driver.interface().ok_or(BackboneError::NoInterface)?;
        log::info!(target: tag(), "Connected to '{}' on {} ({})", sta.ssid, iface.name, iface.ip);
        Ok((iface, monitor))
    } else {
        log::error!(target: tag(), "Failed to connect to '{}'", sta.ssid);
        Err(BackboneError::RetriesExhausted {
            retries: config.max_retry,
        }
        .into())
    }
}

// ============================================================================
// Threaded event loop shared by the host drivers
// ============================================================================

type Associate = Arc<dyn Fn() -> BackboneEvent + Send + Sync>;

/// Runs station events on a dedicated thread, like the system event loop on
/// the device. `associate` performs one association attempt and returns its
/// outcome event. The loop ends when the sender is dropped or the monitor
/// gives up.
fn spawn_event_loop(
    monitor: Arc<ConnectionMonitor>,
    associate: Associate,
) -> Result<Sender<BackboneEvent>> {
    let (tx, rx) = mpsc::channel::<BackboneEvent>();

    std::thread::Builder::new()
        .name("sys_evt".to_string())
        .spawn(move || {
            while let Ok(event) = rx.recv() {
                let mut next = Some(event);
                while let Some(event) = next.take() {
                    if monitor.handle_event(&event) == EventAction::Connect {
                        next = Some(associate());
                    }
                }
                if monitor.has_failed() {
                    break;
                }
            }
        })
        .map_err(|e| Error::platform(format!("event loop spawn failed: {}", e)))?;

    tx.send(BackboneEvent::StaStart)
        .map_err(|_| BackboneError::DriverFailed {
            op: "start",
            reason: "event loop closed".to_string(),
        })?;
    Ok(tx)
}

fn check_credentials(sta: &StaConfig) -> Result<()> {
    if sta.ssid.is_empty() {
        return Err(BackboneError::InvalidCredentials {
            reason: "empty SSID".to_string(),
        }
        .into());
    }
    if sta.auth_threshold != AuthThreshold::Open && sta.password.is_empty() {
        return Err(BackboneError::InvalidCredentials {
            reason: format!("{:?} requires a password", sta.auth_threshold),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// Host driver
// ============================================================================

/// Host backbone: uses an existing network interface of the machine.
///
/// An association attempt succeeds when a non-loopback IPv4 interface
/// (optionally with a given name) is up, and reports `no AP found` after
/// `retry_interval` otherwise.
#[cfg(feature = "host")]
pub struct HostBackbone {
    interface_name: Option<String>,
    retry_interval: Duration,
    sta: Option<StaConfig>,
    iface: Arc<Mutex<Option<BackboneInterface>>>,
    events: Option<Sender<BackboneEvent>>,
    associate: Option<Associate>,
}

#[cfg(feature = "host")]
impl HostBackbone {
    /// `interface_name` restricts the search to one interface.
    pub fn new(interface_name: Option<String>) -> Self {
        Self {
            interface_name,
            retry_interval: Duration::from_secs(1),
            sta: None,
            iface: Arc::new(Mutex::new(None)),
            events: None,
            associate: None,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn resolve(name: Option<&str>) -> Option<BackboneInterface> {
        let addrs = match if_addrs::get_if_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                log::warn!(target: tag(), "Failed to list interfaces: {}", e);
                return None;
            }
        };
        addrs.into_iter().find_map(|iface| {
            if iface.is_loopback() || name.is_some_and(|n| n != iface.name) {
                return None;
            }
            match iface.ip() {
                std::net::IpAddr::V4(ip) => Some(BackboneInterface {
                    name: iface.name,
                    ip,
                }),
                std::net::IpAddr::V6(_) => None,
            }
        })
    }
}

#[cfg(feature = "host")]
impl BackboneDriver for HostBackbone {
    fn configure(&mut self, sta: &StaConfig) -> Result<()> {
        check_credentials(sta)?;
        self.sta = Some(sta.clone());
        Ok(())
    }

    fn start(&mut self, monitor: Arc<ConnectionMonitor>) -> Result<()> {
        if self.sta.is_none() {
            return Err(BackboneError::DriverFailed {
                op: "start",
                reason: "station not configured".to_string(),
            }
            .into());
        }

        let name = self.interface_name.clone();
        let slot = self.iface.clone();
        let interval = self.retry_interval;
        let associate: Associate = Arc::new(move || match Self::resolve(name.as_deref()) {
            Some(iface) => {
                let ip = iface.ip;
                *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(iface);
                BackboneEvent::GotIp { ip }
            }
            None => {
                std::thread::sleep(interval);
                BackboneEvent::StaDisconnected {
                    reason: REASON_NO_AP_FOUND,
                }
            }
        });

        self.events = Some(spawn_event_loop(monitor, associate.clone())?);
        self.associate = Some(associate);
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        let (events, associate) = match (&self.events, &self.associate) {
            (Some(events), Some(associate)) => (events, associate),
            _ => {
                return Err(BackboneError::DriverFailed {
                    op: "connect",
                    reason: "station not started".to_string(),
                }
                .into())
            }
        };
        events.send(associate()).map_err(|_| {
            BackboneError::DriverFailed {
                op: "connect",
                reason: "event loop closed".to_string(),
            }
            .into()
        })
    }

    fn interface(&self) -> Option<BackboneInterface> {
        self.iface.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

// ============================================================================
// Scripted driver
// ============================================================================

/// Driver that plays back a list of association outcomes.
///
/// Each attempt pops the next outcome: `Some(ip)` connects, `None` fails
/// with an authentication error. An exhausted script keeps failing.
#[derive(Clone)]
pub struct ScriptedBackbone {
    outcomes: Arc<Mutex<VecDeque<Option<Ipv4Addr>>>>,
    attempts: Arc<AtomicU32>,
    configured: Arc<Mutex<Option<StaConfig>>>,
    iface: Arc<Mutex<Option<BackboneInterface>>>,
    events: Option<Sender<BackboneEvent>>,
}

impl ScriptedBackbone {
    pub fn new(outcomes: impl IntoIterator<Item = Option<Ipv4Addr>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into_iter().collect())),
            attempts: Arc::new(AtomicU32::new(0)),
            configured: Arc::new(Mutex::new(None)),
            iface: Arc::new(Mutex::new(None)),
            events: None,
        }
    }

    /// Connects on the first attempt.
    pub fn connecting(ip: Ipv4Addr) -> Self {
        Self::new([Some(ip)])
    }

    /// Never connects.
    pub fn unreachable() -> Self {
        Self::new([])
    }

    /// Association attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Credentials passed to `configure`.
    pub fn configured(&self) -> Option<StaConfig> {
        self.configured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn associator(&self) -> Associate {
        let outcomes = self.outcomes.clone();
        let attempts = self.attempts.clone();
        let slot = self.iface.clone();
        Arc::new(move || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let next = outcomes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .flatten();
            match next {
                Some(ip) => {
                    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(BackboneInterface {
                        name: "sta0".to_string(),
                        ip,
                    });
                    BackboneEvent::GotIp { ip }
                }
                None => BackboneEvent::StaDisconnected {
                    reason: REASON_AUTH_FAIL,
                },
            }
        })
    }
}

impl BackboneDriver for ScriptedBackbone {
    fn configure(&mut self, sta: &StaConfig) -> Result<()> {
        check_credentials(sta)?;
        *self.configured.lock().unwrap_or_else(|e| e.into_inner()) = Some(sta.clone());
        Ok(())
    }

    fn start(&mut self, monitor: Arc<ConnectionMonitor>) -> Result<()> {
        self.events = Some(spawn_event_loop(monitor, self.associator())?);
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        let events = self.events.as_ref().ok_or(BackboneError::DriverFailed {
            op: "connect",
            reason: "station not started".to_string(),
        })?;
        let associate = self.associator();
        events.send(associate()).map_err(|_| {
            BackboneError::DriverFailed {
                op: "connect",
                reason: "event loop closed".to_string(),
            }
            .into()
        })
    }

    fn interface(&self) -> Option<BackboneInterface> {
        self.iface.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wifi(max_retry: u32) -> WifiConfig {
        WifiConfig {
            ssid: "home".to_string(),
            password: "password123".to_string(),
            max_retry,
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_wait_does_not_clear() {
        let flags = EventFlags::new();
        flags.set(CONNECTED_BIT);
        assert_eq!(flags.wait_any(CONNECTED_BIT | FAIL_BIT, None), CONNECTED_BIT);
        assert_eq!(flags.bits(), CONNECTED_BIT);
        flags.clear(CONNECTED_BIT);
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn test_flags_timeout() {
        let flags = EventFlags::new();
        let bits = flags.wait_any(FAIL_BIT, Some(Duration::from_millis(20)));
        assert_eq!(bits & FAIL_BIT, 0);
    }

    #[test]
    fn test_flags_wake_from_other_thread() {
        let flags = Arc::new(EventFlags::new());
        let setter = flags.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            setter.set(FAIL_BIT);
        });
        let bits = flags.wait_any(CONNECTED_BIT | FAIL_BIT, Some(Duration::from_secs(5)));
        assert_eq!(bits, FAIL_BIT);
        handle.join().unwrap();
    }

    #[test]
    fn test_monitor_start_connects() {
        let monitor = ConnectionMonitor::new(3);
        assert_eq!(monitor.handle_event(&BackboneEvent::StaStart), EventAction::Connect);
    }

    #[test]
    fn test_monitor_retry_budget() {
        let monitor = ConnectionMonitor::new(2);
        let lost = BackboneEvent::StaDisconnected { reason: 201 };
        assert_eq!(monitor.handle_event(&lost), EventAction::Connect);
        assert_eq!(monitor.handle_event(&lost), EventAction::Connect);
        assert_eq!(monitor.retry_count(), 2);
        assert_eq!(monitor.handle_event(&lost), EventAction::None);
        assert!(monitor.has_failed());
        assert!(!monitor.is_connected());
    }

    #[test]
    fn test_monitor_zero_retries_forever() {
        let monitor = ConnectionMonitor::new(0);
        let lost = BackboneEvent::StaDisconnected { reason: 2 };
        for _ in 0..100 {
            assert_eq!(monitor.handle_event(&lost), EventAction::Connect);
        }
        assert!(!monitor.has_failed());
    }

    #[test]
    fn test_monitor_got_ip_resets_counter() {
        let monitor = ConnectionMonitor::new(5);
        let lost = BackboneEvent::StaDisconnected { reason: 2 };
        monitor.handle_event(&lost);
        monitor.handle_event(&lost);
        let ip = Ipv4Addr::new(192, 168, 1, 40);
        assert_eq!(monitor.handle_event(&BackboneEvent::GotIp { ip }), EventAction::None);
        assert_eq!(monitor.retry_count(), 0);
        assert!(monitor.is_connected());
        assert_eq!(monitor.ip(), Some(ip));
    }

    #[test]
    fn test_bring_up_connects_after_retries() {
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        let mut driver = ScriptedBackbone::new([None, None, Some(ip)]);
        let (iface, monitor) = bring_up_backbone(&mut driver, &wifi(5)).unwrap();
        assert_eq!(iface.ip, ip);
        assert_eq!(driver.attempts(), 3);
        assert_eq!(monitor.retry_count(), 0);
        assert_eq!(driver.configured().unwrap().ssid, "home");
    }

    #[test]
    fn test_bring_up_gives_up() {
        let mut driver = ScriptedBackbone::unreachable();
        let err = bring_up_backbone(&mut driver, &wifi(3)).unwrap_err();
        assert!(err.requires_restart());
        // first attempt plus three retries
        assert_eq!(driver.attempts(), 4);
    }

    #[test]
    fn test_configure_rejects_missing_password() {
        let mut driver = ScriptedBackbone::unreachable();
        let mut config = wifi(1);
        config.password.clear();
        let err = bring_up_backbone(&mut driver, &config).unwrap_err();
        assert_eq!(err.code(), "E_WIFI_CREDENTIALS");
    }

    #[test]
    fn test_open_network_needs_no_password() {
        let ip = Ipv4Addr::new(10, 0, 0, 8);
        let mut driver = ScriptedBackbone::connecting(ip);
        let mut config = wifi(1);
        config.password.clear();
        config.auth_threshold = AuthThreshold::Open;
        assert!(bring_up_backbone(&mut driver, &config).is_ok());
    }
}
