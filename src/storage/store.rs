// ShareStore - Persistent key-value storage using sled
//
// Provides typed access for storing:
// - Sharing registry state
// - Entitlement ledger state
// - Overlay sync queue state

use crate::ledger::EntitlementLedger;
use crate::overlay::SyncSupervisor;
use crate::sharing::SharingRegistry;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const SHARING_STATE: &[u8] = b"sharing:state";
    pub const LEDGER_STATE: &[u8] = b"ledger:state";
    pub const OVERLAY_STATE: &[u8] = b"overlay:state";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of keys in the database
    pub key_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent key-value store for engine state
///
/// Uses sled for crash-safe, embedded storage.
/// All writes are atomic and durable after flush.
pub struct ShareStore {
    db: sled::Db,
}

impl ShareStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.db.is_empty())
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            key_count: self.db.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }

    /// Put raw bytes
    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Get raw bytes
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db.remove(key)?;
        Ok(())
    }

    // ========================================================================
    // ENGINE STATE PERSISTENCE
    // ========================================================================

    /// Save the sharing registry
    pub fn save_registry(&self, registry: &SharingRegistry) -> Result<(), StoreError> {
        self.put_raw(keys::SHARING_STATE, &registry.to_bytes())
    }

    /// Load the sharing registry
    pub fn load_registry(&self) -> Result<Option<SharingRegistry>, StoreError> {
        match self.get_raw(keys::SHARING_STATE)? {
            Some(bytes) => {
                let registry = SharingRegistry::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(registry))
            }
            None => Ok(None),
        }
    }

    /// Save the entitlement ledger
    pub fn save_ledger(&self, ledger: &EntitlementLedger) -> Result<(), StoreError> {
        self.put_raw(keys::LEDGER_STATE, &ledger.to_bytes())
    }

    /// Load the entitlement ledger
    pub fn load_ledger(&self) -> Result<Option<EntitlementLedger>, StoreError> {
        match self.get_raw(keys::LEDGER_STATE)? {
            Some(bytes) => {
                let ledger = EntitlementLedger::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(ledger))
            }
            None => Ok(None),
        }
    }

    /// Save the sync supervisor (queue, jobs, stats, config)
    pub fn save_supervisor(&self, supervisor: &SyncSupervisor) -> Result<(), StoreError> {
        self.put_raw(keys::OVERLAY_STATE, &supervisor.to_bytes())
    }

    /// Load the sync supervisor
    pub fn load_supervisor(&self) -> Result<Option<SyncSupervisor>, StoreError> {
        match self.get_raw(keys::OVERLAY_STATE)? {
            Some(bytes) => {
                let supervisor = SyncSupervisor::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(supervisor))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = ShareStore::open(temp_dir.path()).unwrap();

        store.put_raw(b"test", b"value").unwrap();
        let result = store.get_raw(b"test").unwrap();

        assert_eq!(result, Some(b"value".to_vec()));
    }

    #[test]
    fn test_store_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = ShareStore::open(temp_dir.path()).unwrap();
            store.put_raw(b"persist", b"data").unwrap();
            store.flush().unwrap();
        }

        {
            let store = ShareStore::open(temp_dir.path()).unwrap();
            let result = store.get_raw(b"persist").unwrap();
            assert_eq!(result, Some(b"data".to_vec()));
        }
    }

    #[test]
    fn test_missing_state_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = ShareStore::open(temp_dir.path()).unwrap();

        assert!(store.load_registry().unwrap().is_none());
        assert!(store.load_ledger().unwrap().is_none());
        assert!(store.load_supervisor().unwrap().is_none());
    }
}
