//! SQLite key-value store
//!
//! Host stand-in for the NVS partition: a single-file database holding
//! namespaced blobs. The schema version lives in `PRAGMA user_version`; a
//! file written by a newer build reports `NewVersionFound`, and a file over
//! its size cap reports `NoFreePages`, so the boot-time erase-and-retry path
//! behaves as it does on flash.

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::storage_trait::{validate_key, KeyValueStore, StorageStats, MAX_VALUE_LEN};
use rusqlite::{params, Connection, OptionalExtension};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite-backed [`KeyValueStore`]
pub struct SqliteStore {
    path: String,
    max_size: usize,
    conn: Option<Connection>,
}

impl SqliteStore {
    /// Create a store for the configured file. Nothing is opened until `init`.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_size: config.max_size,
            conn: None,
        }
    }

    /// In-memory database (for testing)
    pub fn memory() -> Self {
        Self::new(&StorageConfig::memory())
    }

    fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| StorageError::NotInitialized.into())
    }

    fn open(&self) -> Result<Connection> {
        let conn = if self.is_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.path)?
        };
        Ok(conn)
    }

    fn used_bytes(conn: &Connection) -> Result<usize> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(used as usize)
    }
}

impl KeyValueStore for SqliteStore {
    fn init(&mut self) -> Result<()> {
        let conn = self.open()?;

        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StorageError::NewVersionFound {
                found: version,
                supported: SCHEMA_VERSION,
            }
            .into());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        if Self::used_bytes(&conn)? > self.max_size {
            return Err(StorageError::NoFreePages.into());
        }

        self.conn = Some(conn);
        log::debug!("SQLite store ready at {}", self.path);
        Ok(())
    }

    fn erase(&mut self) -> Result<()> {
        self.conn = None;
        if !self.is_memory() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        log::info!("Erased SQLite store {}", self.path);
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(namespace, key)?;
        let value = self
            .conn()?
            .query_row(
                "SELECT value FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
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

        let conn = self.conn()?;
        let previous: usize = conn
            .query_row(
                "SELECT LENGTH(value) FROM kv WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .unwrap_or(0) as usize;
        if Self::used_bytes(conn)? - previous + value.len() > self.max_size {
            return Err(StorageError::NoFreePages.into());
        }

        conn.execute(
            "INSERT OR REPLACE INTO kv (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![namespace, key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool> {
        validate_key(namespace, key)?;
        let removed = self.conn()?.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(removed > 0)
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(StorageStats {
            entry_count: count as u64,
            used_bytes: Self::used_bytes(conn)?,
            max_bytes: self.max_size,
        })
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackendType;
    use crate::storage_trait::init_persistent_storage;

    fn file_config(dir: &tempfile::TempDir, max_size: usize) -> StorageConfig {
        StorageConfig {
            backend: StorageBackendType::Sqlite,
            path: dir.path().join("nvs.db").to_string_lossy().into_owned(),
            max_size,
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = SqliteStore::memory();
        store.init().unwrap();
        store.set("openthread", "active", &[0x0e, 0x08]).unwrap();
        assert_eq!(
            store.get("openthread", "active").unwrap(),
            Some(vec![0x0e, 0x08])
        );
        assert_eq!(store.stats().unwrap().entry_count, 1);
        assert!(store.remove("openthread", "active").unwrap());
        assert_eq!(store.get("openthread", "active").unwrap(), None);
    }

    #[test]
    fn test_not_initialized() {
        let store = SqliteStore::memory();
        assert_eq!(store.get("ns", "k").unwrap_err().code(), "E_NVS_NOT_INIT");
    }

    #[test]
    fn test_values_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir, 4096);

        let mut store = SqliteStore::new(&config);
        store.init().unwrap();
        store.set("openthread", "active", b"tlvs").unwrap();
        drop(store);

        let mut store = SqliteStore::new(&config);
        store.init().unwrap();
        assert_eq!(store.get("openthread", "active").unwrap(), Some(b"tlvs".to_vec()));
    }

    #[test]
    fn test_newer_version_is_erased() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir, 4096);
        {
            let conn = Connection::open(&config.path).unwrap();
            conn.pragma_update(None, "user_version", 7u32).unwrap();
        }

        let mut store = SqliteStore::new(&config);
        let err = store.init().unwrap_err();
        assert_eq!(err.code(), "E_NVS_NEW_VERSION");

        init_persistent_storage(&mut store).unwrap();
        assert_eq!(store.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_full_store_reports_no_free_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(&dir, 4096);

        let mut store = SqliteStore::new(&config);
        store.init().unwrap();
        store.set("wifi", "cal", &[0xaa; 3000]).unwrap();
        let err = store.set("wifi", "more", &[0xbb; 2000]).unwrap_err();
        assert_eq!(err.code(), "E_NVS_NO_FREE_PAGES");
        drop(store);

        // shrink the cap: the existing file no longer fits
        config.max_size = 1024;
        let mut store = SqliteStore::new(&config);
        assert_eq!(store.init().unwrap_err().code(), "E_NVS_NO_FREE_PAGES");
        init_persistent_storage(&mut store).unwrap();
        assert_eq!(store.get("wifi", "cal").unwrap(), None);
    }
}
