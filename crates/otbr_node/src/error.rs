//! Error types for the border router node.
//!
//! Errors are grouped by the subsystem that produced them so the entry
//! points can decide between the three outcomes the device knows about:
//! halt (fatal startup failure), delayed reboot (backbone retry budget
//! exhausted), or log-and-continue (everything else).
//!
//! # Error Categories
//!
//! - **Config**: Configuration and validation errors
//! - **Storage**: Persistent key-value store errors
//! - **Backbone**: Wi-Fi station bring-up errors
//! - **Discovery**: mDNS responder errors
//! - **Dataset**: Thread operational dataset encoding errors
//! - **Thread**: Errors reported by the OpenThread stack
//!
//! # Examples
//!
//! ```
//! use otbr_node::{BackboneError, Error};
//!
//! let err = Error::Backbone(BackboneError::RetriesExhausted { retries: 5 });
//! assert!(err.requires_restart());
//! assert!(!err.is_fatal());
//! assert_eq!(err.code(), "E_WIFI_RETRIES");
//! ```

use crate::config::ConfigError;

/// A specialized `Result` type for border router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the border router node.
#[derive(Debug)]
pub enum Error {
    /// An error related to the node's configuration.
    Config(ConfigError),
    /// An error from the persistent key-value store.
    Storage(StorageError),
    /// An error bringing up the Wi-Fi backbone.
    Backbone(BackboneError),
    /// An error from the mDNS responder.
    Discovery(DiscoveryError),
    /// An error decoding or validating an operational dataset.
    Dataset(DatasetError),
    /// An error reported by the Thread stack.
    Thread(ThreadError),
    /// A platform service (event fds, task spawn) failed.
    Platform(String),
    /// An error that occurred during data serialization or deserialization.
    Serialization(String),
    /// An error from the underlying I/O system.
    Io(std::io::Error),
    /// An unexpected internal error, which may indicate a bug.
    Internal(String),
}

/// Errors related to the persistent key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store has no free pages left; erasing it recovers.
    NoFreePages,
    /// The store was written by a newer format version; erasing it recovers.
    NewVersionFound { found: u32, supported: u32 },
    /// The store was used before `init` succeeded.
    NotInitialized,
    /// Namespace or key is empty or too long.
    InvalidKey { key: String },
    /// Value exceeds the per-entry size limit.
    ValueTooLarge { key: String, len: usize, max: usize },
    /// Generic backend error.
    Backend(String),
}

/// Errors related to the Wi-Fi backbone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackboneError {
    /// The station configuration was rejected by the driver.
    InvalidCredentials { reason: String },
    /// A driver operation failed.
    DriverFailed { op: &'static str, reason: String },
    /// The connection failed after the configured number of retries.
    RetriesExhausted { retries: u32 },
    /// No usable network interface is available.
    NoInterface,
}

/// Errors related to the mDNS responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The responder could not be started.
    ResponderInit(String),
    /// Hostname or instance name is not a valid DNS label.
    InvalidName { name: String },
    /// Service registration failed.
    RegisterFailed { service: String, reason: String },
}

/// Errors related to operational dataset encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    /// The hex string is empty.
    EmptyHex,
    /// The hex string has an odd number of digits.
    OddLength { len: usize },
    /// A character is not a hex digit.
    InvalidHexDigit { index: usize },
    /// The encoded dataset exceeds the maximum TLV length.
    TooLong { len: usize, max: usize },
    /// A TLV header or value runs past the end of the buffer.
    MalformedTlv { offset: usize },
    /// A component required for an active dataset is missing.
    MissingComponent(&'static str),
    /// The stack handed back an empty TLV buffer.
    EmptyTlvs,
    /// A TLV value is out of range.
    InvalidValue { tlv: &'static str, reason: String },
}

/// Errors reported by the Thread stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Stack initialization failed.
    InitFailed(String),
    /// The stack was used before `init`.
    NotInitialized,
    /// No active dataset is stored.
    NotFound,
    /// The stack rejected the request (`otError` code or reason).
    Rejected { op: &'static str, code: i32 },
    /// The operation is not allowed in the current state.
    InvalidState(String),
    /// Border router (backbone glue) setup failed.
    BorderRouter(String),
    /// The run loop exited.
    MainloopExited(String),
}

// ============================================================================
// Display implementations
// ============================================================================

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
            Error::Backbone(e) => write!(f, "Wi-Fi error: {}", e),
            Error::Discovery(e) => write!(f, "mDNS error: {}", e),
            Error::Dataset(e) => write!(f, "Dataset error: {}", e),
            Error::Thread(e) => write!(f, "Thread error: {}", e),
            Error::Platform(s) => write!(f, "Platform error: {}", s),
            Error::Serialization(s) => write!(f, "Serialization error: {}", s),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Internal(s) => write!(f, "Internal error: {}", s),
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NoFreePages => write!(f, "No free pages"),
            StorageError::NewVersionFound { found, supported } => {
                write!(f, "New version found: v{} (supported v{})", found, supported)
            }
            StorageError::NotInitialized => write!(f, "Store not initialized"),
            StorageError::InvalidKey { key } => write!(f, "Invalid key: '{}'", key),
            StorageError::ValueTooLarge { key, len, max } => {
                write!(f, "Value for '{}' too large: {} > {} bytes", key, len, max)
            }
            StorageError::Backend(s) => write!(f, "{}", s),
        }
    }
}

impl std::fmt::Display for BackboneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackboneError::InvalidCredentials { reason } => {
                write!(f, "Invalid credentials: {}", reason)
            }
            BackboneError::DriverFailed { op, reason } => write!(f, "{} failed: {}", op, reason),
            BackboneError::RetriesExhausted { retries } => {
                write!(f, "Connection failed after {} retries", retries)
            }
            BackboneError::NoInterface => write!(f, "No network interface available"),
        }
    }
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::ResponderInit(s) => write!(f, "Responder init failed: {}", s),
            DiscoveryError::InvalidName { name } => write!(f, "Invalid name: '{}'", name),
            DiscoveryError::RegisterFailed { service, reason } => {
                write!(f, "Registering {} failed: {}", service, reason)
            }
        }
    }
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::EmptyHex => write!(f, "Empty hex string"),
            DatasetError::OddLength { len } => write!(f, "Odd hex length: {}", len),
            DatasetError::InvalidHexDigit { index } => {
                write!(f, "Invalid hex digit at index {}", index)
            }
            DatasetError::TooLong { len, max } => {
                write!(f, "Dataset too long: {} > {} bytes", len, max)
            }
            DatasetError::MalformedTlv { offset } => write!(f, "Malformed TLV at offset {}", offset),
            DatasetError::MissingComponent(name) => write!(f, "Missing component: {}", name),
            DatasetError::EmptyTlvs => write!(f, "Stack returned no dataset TLVs"),
            DatasetError::InvalidValue { tlv, reason } => {
                write!(f, "Invalid {} value: {}", tlv, reason)
            }
        }
    }
}

impl std::fmt::Display for ThreadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadError::InitFailed(s) => write!(f, "Stack init failed: {}", s),
            ThreadError::NotInitialized => write!(f, "Stack not initialized"),
            ThreadError::NotFound => write!(f, "No active dataset"),
            ThreadError::Rejected { op, code } => write!(f, "{} rejected: {}", op, code),
            ThreadError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            ThreadError::BorderRouter(s) => write!(f, "Border router init failed: {}", s),
            ThreadError::MainloopExited(s) => write!(f, "Main loop exited: {}", s),
        }
    }
}

// ============================================================================
// std::error::Error implementations
// ============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for StorageError {}
impl std::error::Error for BackboneError {}
impl std::error::Error for DiscoveryError {}
impl std::error::Error for DatasetError {}
impl std::error::Error for ThreadError {}

// ============================================================================
// From implementations
// ============================================================================

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

impl From<BackboneError> for Error {
    fn from(e: BackboneError) -> Self {
        Error::Backbone(e)
    }
}

impl From<DiscoveryError> for Error {
    fn from(e: DiscoveryError) -> Self {
        Error::Discovery(e)
    }
}

impl From<DatasetError> for Error {
    fn from(e: DatasetError) -> Self {
        Error::Dataset(e)
    }
}

impl From<ThreadError> for Error {
    fn from(e: ThreadError) -> Self {
        Error::Thread(e)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Backend(e.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

// ============================================================================
// Classification
// ============================================================================

impl Error {
    /// Create a storage error from a string.
    pub fn storage(s: impl Into<String>) -> Self {
        Error::Storage(StorageError::Backend(s.into()))
    }

    /// Create a platform error from a string.
    pub fn platform(s: impl Into<String>) -> Self {
        Error::Platform(s.into())
    }

    /// Returns `true` if the device should halt: the failure happened in a
    /// subsystem that startup cannot continue without.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Storage(_) | Error::Platform(_) => true,
            Error::Thread(e) => matches!(
                e,
                ThreadError::InitFailed(_) | ThreadError::BorderRouter(_)
            ),
            Error::Backbone(e) => !matches!(e, BackboneError::RetriesExhausted { .. }),
            Error::Discovery(DiscoveryError::ResponderInit(_)) => true,
            _ => false,
        }
    }

    /// Returns `true` if the device should reboot after the reboot delay.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Error::Backbone(BackboneError::RetriesExhausted { .. })
        )
    }

    /// Returns `true` if this is a storage error that erasing the store fixes.
    pub fn is_recoverable_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::NoFreePages)
                | Error::Storage(StorageError::NewVersionFound { .. })
        )
    }

    /// Returns an error code string for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "E_CONFIG",
            Error::Storage(e) => match e {
                StorageError::NoFreePages => "E_NVS_NO_FREE_PAGES",
                StorageError::NewVersionFound { .. } => "E_NVS_NEW_VERSION",
                StorageError::NotInitialized => "E_NVS_NOT_INIT",
                StorageError::InvalidKey { .. } => "E_NVS_KEY",
                StorageError::ValueTooLarge { .. } => "E_NVS_VALUE_SIZE",
                StorageError::Backend(_) => "E_NVS_OTHER",
            },
            Error::Backbone(e) => match e {
                BackboneError::InvalidCredentials { .. } => "E_WIFI_CREDENTIALS",
                BackboneError::DriverFailed { .. } => "E_WIFI_DRIVER",
                BackboneError::RetriesExhausted { .. } => "E_WIFI_RETRIES",
                BackboneError::NoInterface => "E_WIFI_NO_IFACE",
            },
            Error::Discovery(_) => "E_MDNS",
            Error::Dataset(_) => "E_DATASET",
            Error::Thread(e) => match e {
                ThreadError::InitFailed(_) => "E_OT_INIT",
                ThreadError::NotInitialized => "E_OT_NOT_INIT",
                ThreadError::NotFound => "E_OT_NOT_FOUND",
                ThreadError::Rejected { .. } => "E_OT_REJECTED",
                ThreadError::InvalidState(_) => "E_OT_STATE",
                ThreadError::BorderRouter(_) => "E_OT_BR",
                ThreadError::MainloopExited(_) => "E_OT_MAINLOOP",
            },
            Error::Platform(_) => "E_PLATFORM",
            Error::Serialization(_) => "E_SERDE",
            Error::Io(_) => "E_IO",
            Error::Internal(_) => "E_INTERNAL",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
