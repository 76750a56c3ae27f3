//! Storage factory for backend selection
//!
//! Creates the key-value store named by [`StorageConfig::backend`].

use crate::config::{StorageBackendType, StorageConfig};
#[allow(unused_imports)]
use crate::error::Error;
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::storage_trait::{share, SharedStore};

/// Create the configured store. The store is not initialized yet; pass it
/// through [`init_persistent_storage`](crate::storage_trait::init_persistent_storage).
pub fn open_store(config: &StorageConfig) -> Result<SharedStore> {
    match config.backend {
        #[cfg(feature = "sqlite")]
        StorageBackendType::Sqlite => Ok(share(crate::storage::SqliteStore::new(config))),
        #[cfg(not(feature = "sqlite"))]
        StorageBackendType::Sqlite => Err(Error::storage(
            "SQLite backend not available. Compile with --features sqlite",
        )),

        #[cfg(feature = "esp32")]
        StorageBackendType::Nvs => Ok(share(crate::esp32::EspNvsStore::new(&config.path))),
        #[cfg(not(feature = "esp32"))]
        StorageBackendType::Nvs => Err(Error::storage(
            "NVS backend not available. Compile with --features esp32",
        )),

        StorageBackendType::Memory => Ok(share(MemoryStore::with_capacity(config.max_size))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_trait::lock_store;

    #[test]
    fn test_open_memory() {
        let store = open_store(&StorageConfig::memory()).unwrap();
        let mut store = lock_store(&store).unwrap();
        assert_eq!(store.backend_name(), "memory");
        store.init().unwrap();
    }

    #[test]
    #[cfg(feature = "sqlite")]
    fn test_open_sqlite() {
        let config = StorageConfig {
            backend: StorageBackendType::Sqlite,
            path: ":memory:".to_string(),
            ..Default::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(lock_store(&store).unwrap().backend_name(), "sqlite");
    }

    #[test]
    #[cfg(not(feature = "esp32"))]
    fn test_nvs_unavailable_on_host() {
        let config = StorageConfig {
            backend: StorageBackendType::Nvs,
            ..Default::default()
        };
        assert!(open_store(&config).is_err());
    }
}
