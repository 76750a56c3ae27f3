//! Configuration for the border router node.
//!
//! Every device on the same network needs a unique device name; everything
//! else usually stays at its default. Values come from three layers:
//!
//! - [`Config::compiled()`] - defaults baked into the firmware at build time
//!   from `OTBR_*` build-environment variables
//! - [`Config::from_env()`] - the same variables read at runtime (host builds)
//! - [`Config::from_file()`] - a JSON file, missing fields take defaults
//!
//! # Examples
//!
//! ```
//! # use otbr_node::Config;
//! let mut config = Config::default();
//! config.device.name = "otbr-garage".to_string();
//! config.wifi.ssid = "home".to_string();
//! config.wifi.password = "correct horse".to_string();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.mdns.instance_name(&config.device), "otbr-garage");
//! ```

use crate::{
    ENV_AUTO_START, ENV_CLI_ENABLE, ENV_DATASET_TLVS, ENV_DEVICE_NAME, ENV_NETWORK_NAME,
    ENV_THREAD_CHANNEL, ENV_WIFI_MAX_RETRY, ENV_WIFI_PASSWORD, ENV_WIFI_SSID,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum length of a DNS label (hostname / instance name).
pub const MAX_DEVICE_NAME_LEN: usize = 63;

/// Maximum SSID length in bytes (802.11).
pub const MAX_SSID_LEN: usize = 32;

/// WPA2 passphrase bounds in bytes.
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 64;

/// Maximum Thread network name length in bytes.
pub const MAX_NETWORK_NAME_LEN: usize = 16;

/// Meshcop service port advertised for controller discovery.
pub const MESHCOP_PORT: u16 = 49191;

// Build-time defaults. Set the variable when building the firmware to bake
// a value in; unset variables fall back to the placeholders below.
const COMPILED_DEVICE_NAME: Option<&str> = option_env!("OTBR_DEVICE_NAME");
const COMPILED_WIFI_SSID: Option<&str> = option_env!("OTBR_WIFI_SSID");
const COMPILED_WIFI_PASSWORD: Option<&str> = option_env!("OTBR_WIFI_PASSWORD");
const COMPILED_WIFI_MAX_RETRY: Option<&str> = option_env!("OTBR_WIFI_MAX_RETRY");
const COMPILED_DATASET_TLVS: Option<&str> = option_env!("OTBR_THREAD_DATASET_TLVS");
const COMPILED_AUTO_START: Option<&str> = option_env!("OTBR_THREAD_AUTO_START");
const COMPILED_THREAD_CHANNEL: Option<&str> = option_env!("OTBR_THREAD_CHANNEL");
const COMPILED_NETWORK_NAME: Option<&str> = option_env!("OTBR_THREAD_NETWORK_NAME");
const COMPILED_CLI_ENABLE: Option<&str> = option_env!("OTBR_CLI_ENABLE");

/// Identity of this border router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Unique name, used as log tag, mDNS hostname and `dd` TXT value.
    ///
    /// Examples: `otbr-living-room`, `otbr-garage`, `otbr-upstairs`.
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "otbr-01".to_string(),
        }
    }
}

/// Minimum authentication mode the station accepts from an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthThreshold {
    Open,
    Wpa2Psk,
    Wpa3Psk,
}

impl Default for AuthThreshold {
    fn default() -> Self {
        Self::Wpa2Psk
    }
}

/// Wi-Fi backbone (station mode) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    /// Reconnect attempts before giving up and rebooting. `0` retries forever.
    pub max_retry: u32,
    pub auth_threshold: AuthThreshold,
    /// How long to wait between giving up and restarting the device.
    pub reboot_delay: Duration,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: "YOUR_WIFI_SSID".to_string(),
            password: "YOUR_WIFI_PASSWORD".to_string(),
            max_retry: 0,
            auth_threshold: AuthThreshold::Wpa2Psk,
            reboot_delay: Duration::from_secs(5),
        }
    }
}

impl WifiConfig {
    /// Returns `true` if disconnects are retried without limit.
    pub fn retries_forever(&self) -> bool {
        self.max_retry == 0
    }
}

/// Thread network credentials and provisioning behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Active operational dataset as a TLV hex string, used when no dataset
    /// is saved in persistent storage. Empty means "provision later".
    ///
    /// Copy it from the controller's Thread settings or from another border
    /// router's CLI with `dataset active -x`.
    pub dataset_tlvs: String,
    /// Form a brand new network when neither a saved nor a configured
    /// dataset exists. Usually off so the device waits for credentials.
    pub auto_start: bool,
    /// Channel for an auto-formed network (11-26).
    pub channel: u8,
    /// Network name for an auto-formed network (at most 16 bytes).
    pub network_name: String,
    /// Expose the stack's command line on the serial console.
    pub cli_enabled: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            dataset_tlvs: String::new(),
            auto_start: false,
            channel: 15,
            network_name: "OpenThread-HA".to_string(),
            cli_enabled: true,
        }
    }
}

/// Meshcop discovery advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdnsConfig {
    /// Service instance name. `None` uses the device name.
    pub instance_name: Option<String>,
    /// `vn` TXT value.
    pub vendor_name: String,
    /// `mn` TXT value.
    pub model_name: String,
    pub port: u16,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            vendor_name: "Espressif".to_string(),
            model_name: "ESP32-C6 OTBR".to_string(),
            port: MESHCOP_PORT,
        }
    }
}

impl MdnsConfig {
    /// Instance name to advertise, derived from the device name by default.
    pub fn instance_name<'a>(&'a self, device: &'a DeviceConfig) -> &'a str {
        self.instance_name.as_deref().unwrap_or(&device.name)
    }
}

/// The type of persistent key-value store backing credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// SQLite file (host builds).
    Sqlite,
    /// Non-volatile storage partition (ESP-IDF).
    Nvs,
    /// In-memory store; nothing survives a restart.
    Memory,
}

impl Default for StorageBackendType {
    fn default() -> Self {
        if cfg!(feature = "esp32") {
            Self::Nvs
        } else {
            Self::Sqlite
        }
    }
}

impl std::fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Nvs => write!(f, "nvs"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Persistent storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendType,
    /// Database file (SQLite) or partition label (NVS).
    pub path: String,
    /// Total bytes of values the store accepts before reporting full.
    pub max_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::default(),
            path: if cfg!(feature = "esp32") {
                "nvs".to_string()
            } else {
                "./otbr_nvs.db".to_string()
            },
            max_size: 24 * 1024,
        }
    }
}

impl StorageConfig {
    /// In-memory store for tests.
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendType::Memory,
            path: ":memory:".to_string(),
            ..Default::default()
        }
    }
}

/// Platform resources reserved for the Thread stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Event file descriptors registered for the stack's platform layer.
    pub eventfd_max_fds: usize,
    /// Stack size of the `ot_main` task in bytes.
    pub task_stack_size: usize,
    /// Priority of the `ot_main` task.
    pub task_priority: u8,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            eventfd_max_fds: 4,
            task_stack_size: 20480,
            task_priority: 5,
        }
    }
}

/// The main configuration for a [`BorderRouter`](crate::BorderRouter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub wifi: WifiConfig,
    pub thread: ThreadConfig,
    pub mdns: MdnsConfig,
    pub storage: StorageConfig,
    pub platform: PlatformConfig,
    /// Valid values: "trace", "debug", "info", "warn", "error".
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            wifi: WifiConfig::default(),
            thread: ThreadConfig::default(),
            mdns: MdnsConfig::default(),
            storage: StorageConfig::default(),
            platform: PlatformConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration baked in at build time.
    ///
    /// Reads `OTBR_DEVICE_NAME`, `OTBR_WIFI_SSID`, `OTBR_WIFI_PASSWORD`,
    /// `OTBR_WIFI_MAX_RETRY`, `OTBR_THREAD_DATASET_TLVS`,
    /// `OTBR_THREAD_AUTO_START`, `OTBR_THREAD_CHANNEL`,
    /// `OTBR_THREAD_NETWORK_NAME` and `OTBR_CLI_ENABLE` from the build
    /// environment. Unparseable numbers keep the default.
    pub fn compiled() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| {
            let value = match key {
                ENV_DEVICE_NAME => COMPILED_DEVICE_NAME,
                ENV_WIFI_SSID => COMPILED_WIFI_SSID,
                ENV_WIFI_PASSWORD => COMPILED_WIFI_PASSWORD,
                ENV_WIFI_MAX_RETRY => COMPILED_WIFI_MAX_RETRY,
                ENV_DATASET_TLVS => COMPILED_DATASET_TLVS,
                ENV_AUTO_START => COMPILED_AUTO_START,
                ENV_THREAD_CHANNEL => COMPILED_THREAD_CHANNEL,
                ENV_NETWORK_NAME => COMPILED_NETWORK_NAME,
                ENV_CLI_ENABLE => COMPILED_CLI_ENABLE,
                _ => None,
            };
            value.map(str::to_string)
        });
        config
    }

    /// Creates a `Config` from the compiled defaults plus runtime
    /// environment variables of the same names.
    ///
    /// # Examples
    ///
    /// ```
    /// # use otbr_node::Config;
    /// std::env::set_var("OTBR_THREAD_CHANNEL", "20");
    /// let config = Config::from_env();
    /// assert_eq!(config.thread.channel, 20);
    /// # std::env::remove_var("OTBR_THREAD_CHANNEL");
    /// ```
    pub fn from_env() -> Self {
        let mut config = Self::compiled();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Loads a JSON configuration file. Fields not present keep their
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Parses a JSON configuration document.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(ENV_DEVICE_NAME) {
            self.device.name = name;
        }
        if let Some(ssid) = lookup(ENV_WIFI_SSID) {
            self.wifi.ssid = ssid;
        }
        if let Some(password) = lookup(ENV_WIFI_PASSWORD) {
            self.wifi.password = password;
        }
        if let Some(retry) = lookup(ENV_WIFI_MAX_RETRY).and_then(|s| s.trim().parse().ok()) {
            self.wifi.max_retry = retry;
        }
        if let Some(tlvs) = lookup(ENV_DATASET_TLVS) {
            self.thread.dataset_tlvs = tlvs.trim().to_string();
        }
        if let Some(auto) = lookup(ENV_AUTO_START).and_then(|s| parse_flag(&s)) {
            self.thread.auto_start = auto;
        }
        if let Some(channel) = lookup(ENV_THREAD_CHANNEL).and_then(|s| s.trim().parse().ok()) {
            self.thread.channel = channel;
        }
        if let Some(name) = lookup(ENV_NETWORK_NAME) {
            self.thread.network_name = name;
        }
        if let Some(cli) = lookup(ENV_CLI_ENABLE).and_then(|s| parse_flag(&s)) {
            self.thread.cli_enabled = cli;
        }
    }

    /// Returns a configuration for tests: in-memory storage, a short retry
    /// budget and no serial console.
    pub fn test_mode() -> Self {
        Self {
            device: DeviceConfig {
                name: "otbr-test".to_string(),
            },
            wifi: WifiConfig {
                ssid: "test-ssid".to_string(),
                password: "test-password".to_string(),
                max_retry: 3,
                auth_threshold: AuthThreshold::Wpa2Psk,
                reboot_delay: Duration::from_millis(10),
            },
            thread: ThreadConfig {
                cli_enabled: false,
                ..Default::default()
            },
            mdns: MdnsConfig::default(),
            storage: StorageConfig::memory(),
            platform: PlatformConfig::default(),
            log_level: "debug".to_string(),
        }
    }

    /// Validates the configuration before anything is brought up.
    ///
    /// # Examples
    ///
    /// ```
    /// # use otbr_node::Config;
    /// let mut config = Config::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.thread.channel = 30;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dns_label(&self.device.name)?;
        if let Some(instance) = &self.mdns.instance_name {
            if instance.is_empty() || instance.len() > MAX_DEVICE_NAME_LEN {
                return Err(ConfigError::InvalidDeviceName(instance.clone()));
            }
        }

        let ssid_len = self.wifi.ssid.len();
        if ssid_len == 0 || ssid_len > MAX_SSID_LEN {
            return Err(ConfigError::InvalidSsid(ssid_len));
        }

        let pass_len = self.wifi.password.len();
        let open = self.wifi.auth_threshold == AuthThreshold::Open;
        if (open && pass_len != 0)
            || (!open && !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&pass_len))
        {
            return Err(ConfigError::InvalidPassword(pass_len));
        }

        if !(11..=26).contains(&self.thread.channel) {
            return Err(ConfigError::InvalidChannel(self.thread.channel));
        }

        let name_len = self.thread.network_name.len();
        if name_len == 0 || name_len > MAX_NETWORK_NAME_LEN {
            return Err(ConfigError::InvalidNetworkName(self.thread.network_name.clone()));
        }

        // dataset_tlvs is checked when it is loaded; bad hex falls through to
        // the next dataset source instead of refusing to boot

        if self.platform.eventfd_max_fds == 0 {
            return Err(ConfigError::Invalid("eventfd_max_fds must be > 0".to_string()));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_dns_label(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_DEVICE_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidDeviceName(name.to_string()))
    }
}

/// Defines errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Device name is empty, too long or not a DNS label.
    InvalidDeviceName(String),
    /// SSID length (bytes) outside 1-32.
    InvalidSsid(usize),
    /// Password length (bytes) does not match the auth threshold.
    InvalidPassword(usize),
    /// Thread channel outside 11-26.
    InvalidChannel(u8),
    /// Network name empty or longer than 16 bytes.
    InvalidNetworkName(String),
    /// The configuration contains an invalid setting.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDeviceName(name) => write!(f, "Invalid device name: '{}'", name),
            ConfigError::InvalidSsid(len) => {
                write!(f, "Invalid SSID length: {} bytes (1-{})", len, MAX_SSID_LEN)
            }
            ConfigError::InvalidPassword(len) => {
                write!(f, "Invalid Wi-Fi password length: {} bytes", len)
            }
            ConfigError::InvalidChannel(ch) => write!(f, "Invalid Thread channel: {} (11-26)", ch),
            ConfigError::InvalidNetworkName(name) => {
                write!(f, "Invalid Thread network name: '{}'", name)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.name, "otbr-01");
        assert_eq!(config.wifi.max_retry, 0);
        assert!(config.wifi.retries_forever());
        assert_eq!(config.thread.channel, 15);
        assert_eq!(config.thread.network_name, "OpenThread-HA");
        assert!(!config.thread.auto_start);
        assert!(config.thread.cli_enabled);
        assert_eq!(config.mdns.port, 49191);
    }

    #[test]
    fn test_test_mode_config() {
        let config = Config::test_mode();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackendType::Memory);
        assert!(!config.wifi.retries_forever());
    }

    #[test]
    fn test_instance_name_defaults_to_device() {
        let mut config = Config::default();
        assert_eq!(config.mdns.instance_name(&config.device), "otbr-01");
        config.mdns.instance_name = Some("Living Room BR".to_string());
        assert_eq!(config.mdns.instance_name(&config.device), "Living Room BR");
    }

    #[test]
    fn test_validate_device_name() {
        let mut config = Config::default();
        for bad in ["", "-otbr", "otbr-", "otbr 01", "otbr_01"] {
            config.device.name = bad.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidDeviceName(_))),
                "{:?} should be rejected",
                bad
            );
        }
        config.device.name = "a".repeat(64);
        assert!(config.validate().is_err());
        config.device.name = "otbr-upstairs-2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_wifi() {
        let mut config = Config::default();
        config.wifi.ssid = String::new();
        assert_eq!(config.validate(), Err(ConfigError::InvalidSsid(0)));
        config.wifi.ssid = "x".repeat(33);
        assert_eq!(config.validate(), Err(ConfigError::InvalidSsid(33)));

        config.wifi.ssid = "home".to_string();
        config.wifi.password = "short".to_string();
        assert_eq!(config.validate(), Err(ConfigError::InvalidPassword(5)));

        config.wifi.auth_threshold = AuthThreshold::Open;
        assert!(config.validate().is_err());
        config.wifi.password = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_thread() {
        let mut config = Config::default();
        config.thread.channel = 10;
        assert_eq!(config.validate(), Err(ConfigError::InvalidChannel(10)));
        config.thread.channel = 26;
        assert!(config.validate().is_ok());

        config.thread.network_name = "x".repeat(17);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNetworkName(_))
        ));
        config.thread.network_name = "x".repeat(16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_dataset_hex_still_validates() {
        let mut config = Config::default();
        let oversized = "00".repeat(255);
        for hex in ["0e0", "zz", oversized.as_str()] {
            config.thread.dataset_tlvs = hex.to_string();
            assert!(config.validate().is_ok(), "{}", hex);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_DEVICE_NAME => Some("otbr-garage".to_string()),
            ENV_WIFI_MAX_RETRY => Some("7".to_string()),
            ENV_THREAD_CHANNEL => Some("not-a-number".to_string()),
            ENV_AUTO_START => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(config.device.name, "otbr-garage");
        assert_eq!(config.wifi.max_retry, 7);
        assert_eq!(config.thread.channel, 15);
        assert!(config.thread.auto_start);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env() {
        std::env::set_var(ENV_NETWORK_NAME, "Attic-Mesh");
        std::env::set_var(ENV_CLI_ENABLE, "no");
        let config = Config::from_env();
        std::env::remove_var(ENV_NETWORK_NAME);
        std::env::remove_var(ENV_CLI_ENABLE);

        assert_eq!(config.thread.network_name, "Attic-Mesh");
        assert!(!config.thread.cli_enabled);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otbr.json");
        std::fs::write(&path, r#"{ "wifi": { "ssid": "garage", "max_retry": 5 } }"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.wifi.ssid, "garage");
        assert_eq!(config.wifi.max_retry, 5);

        assert!(Config::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = Config::from_json(
            r#"{ "device": { "name": "otbr-attic" }, "thread": { "auto_start": true } }"#,
        )
        .unwrap();
        assert_eq!(config.device.name, "otbr-attic");
        assert!(config.thread.auto_start);
        assert_eq!(config.thread.channel, 15);
        assert_eq!(config.mdns.vendor_name, "Espressif");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::test_mode();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
        assert!(json.contains("\"memory\""));
    }

    #[test]
    fn test_storage_backend_type_display() {
        assert_eq!(StorageBackendType::Sqlite.to_string(), "sqlite");
        assert_eq!(StorageBackendType::Nvs.to_string(), "nvs");
        assert_eq!(StorageBackendType::Memory.to_string(), "memory");
    }

    #[test]
    fn test_config_error_display() {
        assert!(ConfigError::InvalidChannel(9).to_string().contains('9'));
        assert!(ConfigError::InvalidSsid(40).to_string().contains("40"));
        assert!(ConfigError::Invalid("bad value".to_string())
            .to_string()
            .contains("bad value"));
    }
}
