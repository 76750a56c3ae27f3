#![doc = include_str!("../README.md")]
#![allow(rustdoc::bare_urls)]
//! # OTBR Node - Standalone Thread Border Router
//!
//! Border router firmware core for single-chip devices with a native
//! 802.15.4 radio and a Wi-Fi station, such as the ESP32-C6.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use otbr_node::{
//!     open_store, BorderRouter, Components, Config, HostBackbone, HostPlatform,
//!     MdnsSdResponder, SimulatedThreadStack,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let store = open_store(&config.storage)?;
//!     let components = Components {
//!         store: store.clone(),
//!         backbone: Box::new(HostBackbone::new(None)),
//!         responder: Box::new(MdnsSdResponder::new()),
//!         platform: Arc::new(HostPlatform::new()),
//!         stack: SimulatedThreadStack::new(store),
//!     };
//!
//!     let mut router = BorderRouter::new(config, components)?;
//!     let mesh = router.start()?;
//!     mesh.join()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `host` | mDNS responder and interface lookup for hosts (default) | mdns-sd, if-addrs |
//! | `sqlite` | SQLite key-value store (default) | rusqlite |
//! | `esp32` | NVS, Wi-Fi STA, mDNS and OpenThread on ESP-IDF | esp-idf-svc |
//!
//! ## ESP32-C6 Setup (esp32 feature)
//!
//! The `firmware/esp32c6_otbr` crate builds the device image. It needs the
//! ESP Rust toolchain and an `sdkconfig.defaults` with at least:
//!
//! ```text
//! CONFIG_OPENTHREAD_ENABLED=y
//! CONFIG_OPENTHREAD_BORDER_ROUTER=y
//! CONFIG_OPENTHREAD_RADIO_NATIVE=y
//! CONFIG_LWIP_IPV6_NUM_ADDRESSES=12
//! CONFIG_MDNS_MULTIPLE_INSTANCE=y
//! CONFIG_VFS_SUPPORT_IO=y
//! ```

pub mod backbone;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod memory;
pub mod platform;
pub mod provisioning;
pub mod router;
pub mod simulated;
pub mod thread;

// Storage - trait is always available
pub mod storage_trait;

// Storage backends (feature-gated)
#[cfg(feature = "sqlite")]
pub mod storage;

pub mod storage_factory;

#[cfg(feature = "esp32")]
pub mod esp32;

// Re-export storage types
pub use config::StorageBackendType;
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use storage_factory::open_store;
pub use storage_trait::{
    init_persistent_storage, lock_store, share, KeyValueStore, SharedStore, StorageStats,
};

// Re-exports
#[cfg(feature = "host")]
pub use backbone::HostBackbone;
pub use backbone::{
    bring_up_backbone, BackboneDriver, BackboneEvent, BackboneInterface, ConnectionMonitor,
    ScriptedBackbone,
};
pub use cli::Cli;
pub use config::Config;
pub use dataset::{DatasetTlvs, OperationalDataset};
#[cfg(feature = "host")]
pub use discovery::MdnsSdResponder;
pub use discovery::{start_discovery, MeshcopService, RecordingResponder, ServiceResponder};
pub use error::{
    BackboneError, DatasetError, DiscoveryError, Error, Result, StorageError, ThreadError,
};
pub use platform::{HostPlatform, Platform, RecordingPlatform, TaskSpec};
pub use provisioning::{acquire_dataset, bring_up_mesh, DatasetSource};
pub use router::{run_mesh_task, BorderRouter, Components, MeshTaskHandle};
pub use simulated::{SimulatedProbe, SimulatedThreadStack};
pub use thread::{ChangedFlags, DeviceRole, ThreadInstance, ThreadStack};

#[cfg(feature = "esp32")]
pub use esp32::{EspBackbone, EspMdnsResponder, EspNvsStore, EspOpenThread, EspPlatform};

/// Version information for the crate.
///
/// # Examples
///
/// ```
/// # use otbr_node::VERSION;
/// println!("OTBR node version: {}", VERSION);
/// ```
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable for the device name.
///
/// Used as the mDNS hostname, the default service instance name and the log
/// tag of the startup banner.
pub const ENV_DEVICE_NAME: &str = "OTBR_DEVICE_NAME";

/// Environment variable for the backbone SSID.
pub const ENV_WIFI_SSID: &str = "OTBR_WIFI_SSID";

/// Environment variable for the backbone passphrase.
pub const ENV_WIFI_PASSWORD: &str = "OTBR_WIFI_PASSWORD";

/// Environment variable for the number of reconnect attempts before the
/// device reboots. `0` retries forever.
pub const ENV_WIFI_MAX_RETRY: &str = "OTBR_WIFI_MAX_RETRY";

/// Environment variable holding an active operational dataset as hex TLVs.
///
/// # Examples
///
/// ```bash
/// export OTBR_THREAD_DATASET_TLVS=0e080000000000010000000300000f...
/// ```
pub const ENV_DATASET_TLVS: &str = "OTBR_THREAD_DATASET_TLVS";

/// Environment variable enabling network creation when no dataset is
/// available (`1`, `true`, `yes`, `on`).
pub const ENV_AUTO_START: &str = "OTBR_THREAD_AUTO_START";

/// Environment variable for the channel of a created network.
pub const ENV_THREAD_CHANNEL: &str = "OTBR_THREAD_CHANNEL";

/// Environment variable for the name of a created network.
pub const ENV_NETWORK_NAME: &str = "OTBR_THREAD_NETWORK_NAME";

/// Environment variable enabling the OpenThread console.
pub const ENV_CLI_ENABLE: &str = "OTBR_CLI_ENABLE";
