//! Persistent key-value store trait
//!
//! Wi-Fi calibration data and the Thread stack's settings (including the
//! active dataset) live in a small namespaced key-value store that survives
//! reboots. On the device this is the NVS flash partition; host builds use
//! SQLite or memory.

use crate::error::{Error, Result, StorageError};
use crate::logging::tag;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Longest namespace or key the NVS format accepts.
pub const MAX_KEY_LEN: usize = 15;

/// Largest single value (NVS blob limit for a 4KB page layout).
pub const MAX_VALUE_LEN: usize = 4000;

/// Trait for persistent key-value backends.
///
/// `init` must succeed before any other call. A store that reports
/// [`StorageError::NoFreePages`] or [`StorageError::NewVersionFound`] from
/// `init` can be recovered with `erase` followed by another `init`; see
/// [`init_persistent_storage`].
pub trait KeyValueStore: Send {
    /// Open or mount the store.
    fn init(&mut self) -> Result<()>;

    /// Wipe every namespace. The store must be initialized again afterwards.
    fn erase(&mut self) -> Result<()>;

    /// Read a value.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value. Returns `true` if it existed.
    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool>;

    /// Usage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// A store shared between the startup sequence and the Thread stack.
pub type SharedStore = Arc<Mutex<dyn KeyValueStore>>;

/// Wraps a store for sharing.
pub fn share<S: KeyValueStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Number of stored values
    pub entry_count: u64,
    /// Bytes used by values
    pub used_bytes: usize,
    /// Capacity in bytes
    pub max_bytes: usize,
}

/// Checks namespace and key against the NVS naming rules.
pub fn validate_key(namespace: &str, key: &str) -> std::result::Result<(), StorageError> {
    for part in [namespace, key] {
        if part.is_empty() || part.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey {
                key: format!("{}/{}", namespace, key),
            });
        }
    }
    Ok(())
}

/// Initializes persistent storage the way the device does at boot.
///
/// If the store is full or was written by a newer format, it is erased and
/// initialized once more. Any other failure, or a failure after the erase,
/// is returned and is fatal to startup.
pub fn init_persistent_storage<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<()> {
    match store.init() {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable_storage() => {
            log::warn!(
                target: tag(),
                "{} store needs erase ({}), erasing",
                store.backend_name(),
                e
            );
            store.erase()?;
            store.init()
        }
        Err(e) => Err(e),
    }
}

/// Convenience: lock a shared store, mapping a poisoned lock to a storage error.
pub fn lock_store(store: &SharedStore) -> Result<std::sync::MutexGuard<'_, dyn KeyValueStore + 'static>> {
    store
        .lock()
        .map_err(|_| Error::storage("store lock poisoned"))
}
