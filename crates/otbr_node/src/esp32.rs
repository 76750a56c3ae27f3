//! ESP-IDF backends (feature: esp32)
//!
//! - [`EspNvsStore`] - the default NVS partition
//! - [`EspBackbone`] - Wi-Fi station driven by the system event loop
//! - [`EspMdnsResponder`] - the ESP-IDF mDNS component
//! - [`EspOpenThread`] - OpenThread with the native 802.15.4 radio
//! - [`EspPlatform`] - FreeRTOS delays, tasks and event fds
//!
//! Requires OpenThread, the border router and the mDNS component enabled in
//! `sdkconfig` (see `firmware/esp32c6_otbr/sdkconfig.defaults`).

use crate::backbone::{
    BackboneDriver, BackboneEvent, BackboneInterface, ConnectionMonitor, EventAction, StaConfig,
};
use crate::config::AuthThreshold;
use crate::dataset::{DatasetTlvs, OperationalDataset};
use crate::discovery::{MeshcopService, ServiceResponder};
use crate::error::{BackboneError, DiscoveryError, Error, Result, StorageError, ThreadError};
use crate::logging::tag;
use crate::platform::{Platform, TaskSpec};
use crate::storage_trait::{validate_key, KeyValueStore, StorageStats, MAX_VALUE_LEN};
use crate::thread::{
    ChangedFlags, DeviceRole, HostConnection, OtPlatformConfig, RadioMode, StateChangedCallback,
    ThreadInstance, ThreadStack,
};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::mdns::EspMdns;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{self, esp, EspError};
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
use std::ffi::{c_void, CString};
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

fn esp_err(op: &'static str, e: EspError) -> Error {
    Error::platform(format!("{}: {}", op, e))
}

// ============================================================================
// NVS
// ============================================================================

/// [`KeyValueStore`] on the default NVS partition.
pub struct EspNvsStore {
    partition: Option<EspDefaultNvsPartition>,
}

impl EspNvsStore {
    /// `_label` is accepted for symmetry with other backends; the default
    /// partition is always used.
    pub fn new(_label: &str) -> Self {
        Self { partition: None }
    }

    fn open(&self, namespace: &str) -> Result<EspNvs<NvsDefault>> {
        let partition = self.partition.clone().ok_or(StorageError::NotInitialized)?;
        EspNvs::new(partition, namespace, true)
            .map_err(|e| StorageError::Backend(format!("open {}: {}", namespace, e)).into())
    }
}

impl KeyValueStore for EspNvsStore {
    fn init(&mut self) -> Result<()> {
        let code = unsafe { sys::nvs_flash_init() };
        match code {
            c if c == sys::ESP_OK as i32 => {}
            c if c == sys::ESP_ERR_NVS_NO_FREE_PAGES as i32 => {
                return Err(StorageError::NoFreePages.into())
            }
            c if c == sys::ESP_ERR_NVS_NEW_VERSION_FOUND as i32 => {
                return Err(StorageError::NewVersionFound {
                    found: 0,
                    supported: 0,
                }
                .into())
            }
            c => return Err(StorageError::Backend(format!("nvs_flash_init: {}", c)).into()),
        }
        let partition = EspDefaultNvsPartition::take()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.partition = Some(partition);
        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        self.partition = None;
        esp!(unsafe { sys::nvs_flash_erase() })
            .map_err(|e| StorageError::Backend(format!("nvs_flash_erase: {}", e)))?;
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(namespace, key)?;
        let nvs = self.open(namespace)?;
        let mut buf = vec![0u8; MAX_VALUE_LEN];
        let value = nvs
            .get_raw(key, &mut buf)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn set(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        validate_key(namespace, key)?;
        if value.len() > MAX_VALUE_LEN {
            return Err(StorageError::ValueTooLarge {
                key: key.to_string(),
                len: value.len(),
                max: MAX_VALUE_LEN,
            }
            .into());
        }
        let mut nvs = self.open(namespace)?;
        nvs.set_raw(key, value).map_err(|e| {
            if e.code() == sys::ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 {
                StorageError::NoFreePages
            } else {
                StorageError::Backend(e.to_string())
            }
        })?;
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool> {
        validate_key(namespace, key)?;
        let mut nvs = self.open(namespace)?;
        nvs.remove(key)
            .map_err(|e| StorageError::Backend(e.to_string()).into())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut stats = sys::nvs_stats_t::default();
        esp!(unsafe { sys::nvs_get_stats(std::ptr::null(), &mut stats) })
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        // 32-byte entries
        Ok(StorageStats {
            entry_count: stats.namespace_count as u64,
            used_bytes: stats.used_entries as usize * 32,
            max_bytes: stats.total_entries as usize * 32,
        })
    }

    fn backend_name(&self) -> &'static str {
        "nvs"
    }
}

// ============================================================================
// Wi-Fi station
// ============================================================================

static MONITOR: OnceLock<Arc<ConnectionMonitor>> = OnceLock::new();

fn wifi_connect() {
    if let Err(e) = esp!(unsafe { sys::esp_wifi_connect() }) {
        log::warn!(target: tag(), "esp_wifi_connect failed: {}", e);
    }
}

unsafe extern "C" fn on_system_event(
    _arg: *mut c_void,
    base: sys::esp_event_base_t,
    id: i32,
    data: *mut c_void,
) {
    let Some(monitor) = MONITOR.get() else { return };

    let event = if base == sys::WIFI_EVENT && id == sys::wifi_event_t_WIFI_EVENT_STA_START as i32 {
        BackboneEvent::StaStart
    } else if base == sys::WIFI_EVENT
        && id == sys::wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32
    {
        let info = &*(data as *const sys::wifi_event_sta_disconnected_t);
        BackboneEvent::StaDisconnected {
            reason: info.reason as u16,
        }
    } else if base == sys::IP_EVENT && id == sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32 {
        let info = &*(data as *const sys::ip_event_got_ip_t);
        BackboneEvent::GotIp {
            ip: Ipv4Addr::from(info.ip_info.ip.addr.to_le_bytes()),
        }
    } else {
        return;
    };

    if monitor.handle_event(&event) == EventAction::Connect {
        wifi_connect();
    }
}

/// Wi-Fi station on the ESP32 radio.
///
/// The driver, the default event loop and the netif layer are created on
/// `configure`, after NVS and the eventfd VFS are up.
pub struct EspBackbone {
    modem: Option<Modem>,
    wifi: Option<EspWifi<'static>>,
}

impl EspBackbone {
    pub fn new(modem: Modem) -> Self {
        Self {
            modem: Some(modem),
            wifi: None,
        }
    }

    fn driver(&mut self) -> Result<&mut EspWifi<'static>> {
        if self.wifi.is_none() {
            let modem = self.modem.take().ok_or_else(|| BackboneError::DriverFailed {
                op: "init",
                reason: "modem already in use".to_string(),
            })?;
            let driver_err = |e: EspError| BackboneError::DriverFailed {
                op: "init",
                reason: e.to_string(),
            };
            let sysloop = EspSystemEventLoop::take().map_err(driver_err)?;
            self.wifi = Some(EspWifi::new(modem, sysloop, None).map_err(driver_err)?);
        }
        self.wifi.as_mut().ok_or_else(|| {
            BackboneError::DriverFailed {
                op: "init",
                reason: "no driver".to_string(),
            }
            .into()
        })
    }
}

impl BackboneDriver for EspBackbone {
    fn configure(&mut self, sta: &StaConfig) -> Result<()> {
        let invalid = |what: &str| BackboneError::InvalidCredentials {
            reason: format!("{} too long", what),
        };
        let auth_method = match sta.auth_threshold {
            AuthThreshold::Open => AuthMethod::None,
            AuthThreshold::Wpa2Psk => AuthMethod::WPA2Personal,
            AuthThreshold::Wpa3Psk => AuthMethod::WPA3Personal,
        };
        let client = ClientConfiguration {
            ssid: sta.ssid.as_str().try_into().map_err(|_| invalid("SSID"))?,
            password: sta.password.as_str().try_into().map_err(|_| invalid("password"))?,
            auth_method,
            ..Default::default()
        };
        self.driver()?
            .set_configuration(&Configuration::Client(client))
            .map_err(|e| BackboneError::DriverFailed {
                op: "configure",
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn start(&mut self, monitor: Arc<ConnectionMonitor>) -> Result<()> {
        MONITOR
            .set(monitor)
            .map_err(|_| BackboneError::DriverFailed {
                op: "start",
                reason: "station already started".to_string(),
            })?;

        let register = |base: sys::esp_event_base_t, id: i32| {
            esp!(unsafe {
                sys::esp_event_handler_instance_register(
                    base,
                    id,
                    Some(on_system_event),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            })
        };
        register(unsafe { sys::WIFI_EVENT }, sys::ESP_EVENT_ANY_ID)
            .and_then(|_| register(unsafe { sys::IP_EVENT }, sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32))
            .map_err(|e| BackboneError::DriverFailed {
                op: "register events",
                reason: e.to_string(),
            })?;

        self.driver()?.start().map_err(|e| BackboneError::DriverFailed {
            op: "start",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        esp!(unsafe { sys::esp_wifi_connect() }).map_err(|e| {
            BackboneError::DriverFailed {
                op: "connect",
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn interface(&self) -> Option<BackboneInterface> {
        let ip = MONITOR.get()?.ip()?;
        Some(BackboneInterface {
            name: "sta0".to_string(),
            ip,
        })
    }

    fn name(&self) -> &'static str {
        "esp-wifi"
    }
}

// ============================================================================
// mDNS
// ============================================================================

/// Responder on the ESP-IDF mDNS component.
pub struct EspMdnsResponder {
    mdns: Option<EspMdns>,
}

impl EspMdnsResponder {
    pub fn new() -> Self {
        Self { mdns: None }
    }

    fn mdns(&mut self) -> Result<&mut EspMdns> {
        self.mdns.as_mut().ok_or_else(|| {
            DiscoveryError::ResponderInit("responder not initialized".to_string()).into()
        })
    }
}

impl Default for EspMdnsResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceResponder for EspMdnsResponder {
    fn init(&mut self) -> Result<()> {
        let mdns = EspMdns::take().map_err(|e| DiscoveryError::ResponderInit(e.to_string()))?;
        self.mdns = Some(mdns);
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        self.mdns()?
            .set_hostname(hostname)
            .map_err(|e| DiscoveryError::InvalidName {
                name: format!("{} ({})", hostname, e),
            })?;
        Ok(())
    }

    fn set_instance_name(&mut self, instance: &str) -> Result<()> {
        self.mdns()?
            .set_instance_name(instance)
            .map_err(|e| DiscoveryError::InvalidName {
                name: format!("{} ({})", instance, e),
            })?;
        Ok(())
    }

    fn add_service(&mut self, service: &MeshcopService, _iface: &BackboneInterface) -> Result<()> {
        let txt: Vec<(&str, &str)> = service
            .txt
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.mdns()?
            .add_service(
                Some(&service.instance_name),
                &service.service_type,
                &service.protocol,
                service.port,
                &txt,
            )
            .map_err(|e| DiscoveryError::RegisterFailed {
                service: service.full_name(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "esp-mdns"
    }
}

// ============================================================================
// OpenThread
// ============================================================================

fn ot_check(op: &'static str, code: sys::otError) -> Result<()> {
    if code == sys::otError_OT_ERROR_NONE {
        Ok(())
    } else if code == sys::otError_OT_ERROR_NOT_FOUND {
        Err(ThreadError::NotFound.into())
    } else {
        Err(ThreadError::Rejected {
            op,
            code: code as i32,
        }
        .into())
    }
}

/// The OpenThread instance, valid while the stack lock is held.
pub struct EspOtInstance {
    raw: *mut sys::otInstance,
}

// The raw instance is only touched with the stack lock held.
unsafe impl Send for EspOtInstance {}

impl ThreadInstance for EspOtInstance {
    fn active_dataset(&self) -> Result<OperationalDataset> {
        let mut tlvs = sys::otOperationalDatasetTlvs::default();
        ot_check("dataset get active", unsafe {
            sys::otDatasetGetActiveTlvs(self.raw, &mut tlvs)
        })?;
        Ok(OperationalDataset::from_stack_tlvs(
            &tlvs.mTlvs,
            usize::from(tlvs.mLength),
        )?)
    }

    fn set_active_dataset(&mut self, dataset: &OperationalDataset) -> Result<()> {
        self.set_active_tlvs(&dataset.to_tlvs()?)
    }

    fn set_active_tlvs(&mut self, tlvs: &DatasetTlvs) -> Result<()> {
        let mut raw = sys::otOperationalDatasetTlvs::default();
        raw.mTlvs[..tlvs.len()].copy_from_slice(tlvs.as_bytes());
        raw.mLength = tlvs.len() as u8;
        ot_check("dataset set active", unsafe {
            sys::otDatasetSetActiveTlvs(self.raw, &raw)
        })
    }

    fn create_new_network(&mut self) -> Result<OperationalDataset> {
        let mut dataset = sys::otOperationalDataset::default();
        ot_check("create new network", unsafe {
            sys::otDatasetCreateNewNetwork(self.raw, &mut dataset)
        })?;
        let mut tlvs = sys::otOperationalDatasetTlvs::default();
        // returns otError or nothing depending on the OpenThread release;
        // a failed conversion leaves mLength at 0 either way
        unsafe { sys::otDatasetConvertToTlvs(&dataset, &mut tlvs) };
        OperationalDataset::from_stack_tlvs(&tlvs.mTlvs, usize::from(tlvs.mLength)).map_err(|e| {
            log::error!(target: tag(), "Created dataset could not be converted: {}", e);
            e.into()
        })
    }

    fn set_ip6_enabled(&mut self, enabled: bool) -> Result<()> {
        ot_check("ifconfig", unsafe { sys::otIp6SetEnabled(self.raw, enabled) })
    }

    fn ip6_enabled(&self) -> bool {
        unsafe { sys::otIp6IsEnabled(self.raw) }
    }

    fn set_thread_enabled(&mut self, enabled: bool) -> Result<()> {
        ot_check("thread", unsafe { sys::otThreadSetEnabled(self.raw, enabled) })
    }

    fn device_role(&self) -> DeviceRole {
        DeviceRole::from_raw(unsafe { sys::otThreadGetDeviceRole(self.raw) } as u32)
    }
}

static STATE_CALLBACK: OnceLock<StateChangedCallback> = OnceLock::new();

unsafe extern "C" fn on_state_changed(flags: sys::otChangedFlags, context: *mut c_void) {
    let instance = context as *mut sys::otInstance;
    if let Some(callback) = STATE_CALLBACK.get() {
        let role = DeviceRole::from_raw(sys::otThreadGetDeviceRole(instance) as u32);
        callback(ChangedFlags(flags), role);
    }
}

/// OpenThread as shipped in ESP-IDF.
pub struct EspOpenThread {
    instance: Option<EspOtInstance>,
}

// See EspOtInstance.
unsafe impl Send for EspOpenThread {}

impl EspOpenThread {
    pub fn new() -> Self {
        Self { instance: None }
    }

    fn raw(&self) -> Result<*mut sys::otInstance> {
        self.instance
            .as_ref()
            .map(|i| i.raw)
            .ok_or_else(|| ThreadError::NotInitialized.into())
    }
}

impl Default for EspOpenThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadStack for EspOpenThread {
    type Instance = EspOtInstance;

    fn init(&mut self, config: &OtPlatformConfig) -> Result<()> {
        if config.radio_mode != RadioMode::Native {
            return Err(ThreadError::InitFailed(format!(
                "{:?} radio not supported",
                config.radio_mode
            ))
            .into());
        }
        let partition = CString::new(config.storage_partition.as_str())
            .map_err(|_| ThreadError::InitFailed("bad partition name".to_string()))?;

        let mut platform = sys::esp_openthread_platform_config_t::default();
        platform.radio_config.radio_mode = sys::esp_openthread_radio_mode_t_RADIO_MODE_NATIVE;
        platform.host_config.host_connection_mode = match config.host_connection {
            HostConnection::None => {
                sys::esp_openthread_host_connection_mode_t_HOST_CONNECTION_MODE_NONE
            }
            HostConnection::CliUsb => {
                sys::esp_openthread_host_connection_mode_t_HOST_CONNECTION_MODE_CLI_USB
            }
            HostConnection::CliUart => {
                sys::esp_openthread_host_connection_mode_t_HOST_CONNECTION_MODE_CLI_UART
            }
        };
        // the stack keeps the pointer
        platform.port_config.storage_partition_name = partition.into_raw();
        platform.port_config.netif_queue_size = config.netif_queue_size as u8;
        platform.port_config.task_queue_size = config.task_queue_size as u8;

        esp!(unsafe { sys::esp_openthread_init(&platform) })
            .map_err(|e| ThreadError::InitFailed(e.to_string()))?;
        let raw = unsafe { sys::esp_openthread_get_instance() };
        if raw.is_null() {
            return Err(ThreadError::InitFailed("no instance".to_string()).into());
        }
        self.instance = Some(EspOtInstance { raw });
        Ok(())
    }

    fn set_state_changed_callback(&mut self, callback: StateChangedCallback) -> Result<()> {
        let raw = self.raw()?;
        STATE_CALLBACK
            .set(callback)
            .map_err(|_| ThreadError::InvalidState("callback already set".to_string()))?;
        ot_check("set state callback", unsafe {
            sys::otSetStateChangedCallback(raw, Some(on_state_changed), raw as *mut c_void)
        })
    }

    fn cli_init(&mut self) -> Result<()> {
        self.raw()?;
        unsafe { sys::esp_openthread_cli_init() };
        Ok(())
    }

    fn border_router_init(&mut self, _backbone: &BackboneInterface) -> Result<()> {
        self.raw()?;
        let netif = unsafe { sys::esp_netif_get_handle_from_ifkey(c"WIFI_STA_DEF".as_ptr()) };
        if netif.is_null() {
            return Err(ThreadError::BorderRouter("no Wi-Fi STA netif".to_string()).into());
        }
        unsafe { sys::esp_openthread_set_backbone_netif(netif) };
        esp!(unsafe { sys::esp_openthread_border_router_init() })
            .map_err(|e| ThreadError::BorderRouter(e.to_string()))?;
        Ok(())
    }

    fn with_lock<R>(&self, f: impl FnOnce(&mut Self::Instance) -> R) -> Result<R> {
        let raw = self.raw()?;
        if !unsafe { sys::esp_openthread_lock_acquire(u32::MAX) } {
            return Err(ThreadError::InvalidState("stack lock timeout".to_string()).into());
        }
        let mut instance = EspOtInstance { raw };
        let result = f(&mut instance);
        unsafe { sys::esp_openthread_lock_release() };
        Ok(result)
    }

    fn cli_create_task(&mut self) -> Result<()> {
        unsafe { sys::esp_openthread_cli_create_task() };
        Ok(())
    }

    fn launch_mainloop(&mut self) -> Result<()> {
        esp!(unsafe { sys::esp_openthread_launch_mainloop() })
            .map_err(|e| ThreadError::MainloopExited(e.to_string()).into())
    }

    fn deinit(&mut self) {
        unsafe { sys::esp_openthread_netif_glue_deinit() };
        self.instance = None;
    }
}

// ============================================================================
// Platform
// ============================================================================

/// FreeRTOS platform.
#[derive(Debug, Default)]
pub struct EspPlatform;

impl Platform for EspPlatform {
    fn register_eventfd(&self, max_fds: usize) -> Result<()> {
        let config = sys::esp_vfs_eventfd_config_t { max_fds };
        esp!(unsafe { sys::esp_vfs_eventfd_register(&config) })
            .map_err(|e| esp_err("esp_vfs_eventfd_register", e))
    }

    fn unregister_eventfd(&self) -> Result<()> {
        esp!(unsafe { sys::esp_vfs_eventfd_unregister() })
            .map_err(|e| esp_err("esp_vfs_eventfd_unregister", e))
    }

    fn delay(&self, duration: Duration) {
        FreeRtos::delay_ms(duration.as_millis() as u32);
    }

    fn restart(&self) {
        esp_idf_svc::hal::reset::restart();
    }

    fn spawn_task(&self, spec: &TaskSpec, f: Box<dyn FnOnce() + Send>) -> Result<JoinHandle<()>> {
        let name: &'static [u8] = Box::leak(format!("{}\0", spec.name).into_bytes().into_boxed_slice());
        ThreadSpawnConfiguration {
            name: Some(name),
            stack_size: spec.stack_size,
            priority: spec.priority,
            ..Default::default()
        }
        .set()
        .map_err(|e| esp_err("thread spawn configuration", e))?;

        let handle = std::thread::Builder::new()
            .stack_size(spec.stack_size)
            .spawn(f)
            .map_err(|e| Error::platform(format!("failed to spawn {}: {}", spec.name, e)));

        ThreadSpawnConfiguration::default()
            .set()
            .map_err(|e| esp_err("thread spawn configuration", e))?;
        handle
    }

    fn name(&self) -> &'static str {
        "esp-idf"
    }
}
