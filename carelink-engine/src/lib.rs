//! Clinic persistence on top of fjall

use carelink_core::{CoreError, Result};
use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::Arc;

pub mod store;
pub mod table;

pub use store::*;
pub use table::*;

/// Storage engine wrapping a fjall keyspace
#[derive(Clone)]
pub struct StorageEngine {
    keyspace: Arc<Keyspace>,
}

impl StorageEngine {
    /// Open or create the keyspace at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let keyspace = Config::new(path).open().map_err(storage_error)?;

        Ok(StorageEngine {
            keyspace: Arc::new(keyspace),
        })
    }

    /// Create temporary storage engine for testing
    #[cfg(any(test, feature = "test-utils"))]
    pub fn temp() -> Result<(Self, tempfile::TempDir)> {
        let temp_dir = tempfile::tempdir().map_err(|e| CoreError::Internal(e.to_string()))?;
        let engine = Self::new(temp_dir.path())?;
        Ok((engine, temp_dir))
    }

    pub(crate) fn partition(&self, name: &str) -> Result<PartitionHandle> {
        self.keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .map_err(storage_error)
    }

    /// Start an atomic cross-partition write
    pub(crate) fn batch(&self) -> Batch {
        self.keyspace.batch()
    }

    /// Commit `batch` and sync it to disk
    pub(crate) fn commit(&self, batch: Batch) -> Result<()> {
        batch.commit().map_err(storage_error)?;
        self.persist()
    }

    /// Persist all changes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(storage_error)
    }
}

pub(crate) fn storage_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(err.to_string())
}
