//! Thread stack interface
//!
//! The mesh protocol itself lives in an external stack (OpenThread). This
//! module describes the handful of calls the border router makes into it:
//! [`ThreadStack`] for lifecycle and [`ThreadInstance`] for the dataset and
//! interface calls made under the stack lock.

use crate::backbone::BackboneInterface;
use crate::dataset::{DatasetTlvs, OperationalDataset};
use crate::error::Result;
use crate::logging::tag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `otError` codes the border router reports or maps.
pub mod ot_error {
    pub const NONE: i32 = 0;
    pub const FAILED: i32 = 1;
    pub const PARSE: i32 = 6;
    pub const INVALID_ARGS: i32 = 7;
    pub const INVALID_STATE: i32 = 13;
    pub const NOT_FOUND: i32 = 23;
    pub const ALREADY: i32 = 24;
    pub const INVALID_COMMAND: i32 = 35;

    /// Name the stack's CLI prints for a code.
    pub fn name(code: i32) -> &'static str {
        match code {
            NONE => "OK",
            FAILED => "Failed",
            PARSE => "Parse",
            INVALID_ARGS => "InvalidArgs",
            INVALID_STATE => "InvalidState",
            NOT_FOUND => "NotFound",
            ALREADY => "Already",
            INVALID_COMMAND => "InvalidCommand",
            _ => "Unknown",
        }
    }
}

/// Role of this device in the Thread partition (`otDeviceRole`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
    /// A value the stack reported that has no name here
    Unknown,
}

impl DeviceRole {
    /// Maps the stack's numeric role.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Disabled,
            1 => Self::Detached,
            2 => Self::Child,
            3 => Self::Router,
            4 => Self::Leader,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Detached => "detached",
            Self::Child => "child",
            Self::Router => "router",
            Self::Leader => "leader",
            Self::Unknown => "unknown",
        }
    }

    /// Attached to a partition (child, router or leader).
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Child | Self::Router | Self::Leader)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of state changes reported by the stack (`otChangedFlags`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangedFlags(pub u32);

impl ChangedFlags {
    pub const IP6_ADDRESS_ADDED: ChangedFlags = ChangedFlags(1 << 0);
    pub const IP6_ADDRESS_REMOVED: ChangedFlags = ChangedFlags(1 << 1);
    pub const THREAD_ROLE: ChangedFlags = ChangedFlags(1 << 2);
    pub const THREAD_PARTITION_ID: ChangedFlags = ChangedFlags(1 << 7);
    pub const THREAD_NETDATA: ChangedFlags = ChangedFlags(1 << 9);
    pub const ACTIVE_DATASET: ChangedFlags = ChangedFlags(1 << 17);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ChangedFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ChangedFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ChangedFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Callback invoked by the stack after state changes, with the role at the
/// time of the change.
pub type StateChangedCallback = Box<dyn Fn(ChangedFlags, DeviceRole) + Send + Sync>;

/// Logs role and network-data changes. Purely observational.
///
/// Returns the lines it logged, in order.
pub fn log_state_change(flags: ChangedFlags, role: DeviceRole) -> Vec<String> {
    let mut lines = Vec::new();
    if flags.contains(ChangedFlags::THREAD_ROLE) {
        lines.push(format!("Thread role changed: {}", role));
    }
    if flags.contains(ChangedFlags::THREAD_NETDATA) {
        lines.push("Thread network data updated".to_string());
    }
    for line in &lines {
        log::info!(target: tag(), "{}", line);
    }
    lines
}

/// How the 802.15.4 radio is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    /// On-chip radio (ESP32-C6/H2)
    Native,
    /// External radio co-processor over UART
    UartRcp,
    /// External radio co-processor over SPI
    SpiRcp,
}

/// Where the stack's CLI is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostConnection {
    None,
    /// Console on the USB serial/JTAG port
    CliUsb,
    /// Console on the default UART
    CliUart,
}

/// Platform configuration passed to the stack's `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtPlatformConfig {
    pub radio_mode: RadioMode,
    pub host_connection: HostConnection,
    /// Flash partition holding the stack's settings
    pub storage_partition: String,
    pub netif_queue_size: usize,
    pub task_queue_size: usize,
}

impl OtPlatformConfig {
    /// Native radio with the console on USB serial when `cli` is set.
    pub fn native(cli: bool) -> Self {
        Self {
            radio_mode: RadioMode::Native,
            host_connection: if cli {
                HostConnection::CliUsb
            } else {
                HostConnection::None
            },
            storage_partition: "nvs".to_string(),
            netif_queue_size: 10,
            task_queue_size: 10,
        }
    }
}

/// Calls made on the stack instance while holding the stack lock.
pub trait ThreadInstance {
    /// The active dataset from the stack's settings.
    /// `ThreadError::NotFound` when none is stored.
    fn active_dataset(&self) -> Result<OperationalDataset>;

    /// Stores and activates a dataset.
    fn set_active_dataset(&mut self, dataset: &OperationalDataset) -> Result<()>;

    /// Stores and activates an encoded dataset.
    fn set_active_tlvs(&mut self, tlvs: &DatasetTlvs) -> Result<()>;

    /// Generates a dataset for a new network. Nothing is stored.
    fn create_new_network(&mut self) -> Result<OperationalDataset>;

    fn set_ip6_enabled(&mut self, enabled: bool) -> Result<()>;

    fn ip6_enabled(&self) -> bool;

    fn set_thread_enabled(&mut self, enabled: bool) -> Result<()>;

    fn device_role(&self) -> DeviceRole;
}

/// Lifecycle of the external Thread stack, in call order.
pub trait ThreadStack: Send {
    type Instance: ThreadInstance;

    /// Brings up the radio, settings storage and the instance.
    fn init(&mut self, config: &OtPlatformConfig) -> Result<()>;

    fn set_state_changed_callback(&mut self, callback: StateChangedCallback) -> Result<()>;

    /// Prepares the serial CLI.
    fn cli_init(&mut self) -> Result<()>;

    /// Attaches the border router to the backbone interface.
    fn border_router_init(&mut self, backbone: &BackboneInterface) -> Result<()>;

    /// Runs `f` with the stack lock held.
    fn with_lock<R>(&self, f: impl FnOnce(&mut Self::Instance) -> R) -> Result<R>;

    /// Starts the task that reads CLI input.
    fn cli_create_task(&mut self) -> Result<()>;

    /// Runs the stack's event loop. Does not return in normal operation.
    fn launch_mainloop(&mut self) -> Result<()>;

    /// Releases the netif glue and event fds after the loop exits.
    fn deinit(&mut self);
}
