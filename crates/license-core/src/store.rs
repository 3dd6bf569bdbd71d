//! Persistent Record Storage
//!
//! Durable storage for the one license record owned by this
//! installation. "Absent" is a normal outcome, never an error; only
//! real I/O failures surface as errors, and the caller downgrades
//! those per the fail-open policy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{LicenseError, Result};

/// Record storage trait
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the persisted record bytes, `None` when absent
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Write (replace) the persisted record
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Delete the persisted record; absent is success
    async fn delete(&self) -> Result<()>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        (**self).read().await
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }
}

/// File-backed record store
///
/// One file per installation, path supplied at construction
/// (e.g. `<config dir>/license.json`).
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LicenseError::StorageRead(e.to_string())),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LicenseError::StorageWrite(e.to_string()))?;
        }

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| LicenseError::StorageWrite(e.to_string()))
    }

    async fn delete(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LicenseError::StorageWrite(e.to_string())),
        }
    }
}

/// In-memory record store (for development and tests)
pub struct MemoryRecordStore {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            bytes: RwLock::new(None),
        }
    }

    /// Pre-seed the store with record bytes
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(Some(bytes)),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.read().unwrap().clone())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.write().unwrap() = Some(bytes.to_vec());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        *self.bytes.write().unwrap() = None;
        Ok(())
    }
}
