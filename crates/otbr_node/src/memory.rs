//! In-memory key-value store
//!
//! Nothing survives a restart. Used by tests and by `StorageBackendType::Memory`.
//! Init failures can be queued to exercise the erase-and-retry path.

use crate::error::{Result, StorageError};
use crate::storage_trait::{validate_key, KeyValueStore, StorageStats, MAX_VALUE_LEN};
use std::collections::{BTreeMap, VecDeque};

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<(String, String), Vec<u8>>,
    initialized: bool,
    max_size: usize,
    pending_init_failures: VecDeque<StorageError>,
    erase_count: usize,
}

impl MemoryStore {
    /// Create an empty store with a 24KB capacity.
    pub fn new() -> Self {
        Self::with_capacity(24 * 1024)
    }

    /// Create an empty store holding at most `max_size` bytes of values.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    /// Queue an error for the next `init` call.
    pub fn fail_next_init(&mut self, err: StorageError) {
        self.pending_init_failures.push_back(err);
    }

    /// Number of times the store has been erased.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Write without the init check (test setup).
    pub fn set_unchecked(&mut self, namespace: &str, key: &str, value: Vec<u8>) {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
    }

    fn used_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized.into())
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn init(&mut self) -> Result<()> {
        if let Some(err) = self.pending_init_failures.pop_front() {
            self.initialized = false;
            return Err(err.into());
        }
        if self.used_bytes() > self.max_size {
            return Err(StorageError::NoFreePages.into());
        }
        self.initialized = true;
        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        self.entries.clear();
        self.initialized = false;
        self.erase_count += 1;
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_init()?;
        validate_key(namespace, key)?;
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_init()?;
        validate_key(namespace, key)?;
        if value.len() > MAX_VALUE_LEN {
            return Err(StorageError::ValueTooLarge {
                key: key.to_string(),
                len: value.len(),
                max: MAX_VALUE_LEN,
            }
            .into());
        }

        let id = (namespace.to_string(), key.to_string());
        let previous = self.entries.get(&id).map(Vec::len).unwrap_or(0);
        if self.used_bytes() - previous + value.len() > self.max_size {
            return Err(StorageError::NoFreePages.into());
        }
        self.entries.insert(id, value.to_vec());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool> {
        self.ensure_init()?;
        validate_key(namespace, key)?;
        Ok(self
            .entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            entry_count: self.entries.len() as u64,
            used_bytes: self.used_bytes(),
            max_bytes: self.max_size,
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
