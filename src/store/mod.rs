//! Persistence boundary for configuration and pricing snapshots.
//!
//! Snapshots are opaque text blobs keyed by name. Two implementations are
//! provided:
//! - [`FileBlobStore`]: one file per key, atomic writes (temp file + rename)
//!   to prevent corruption.
//! - [`MemoryBlobStore`]: process-local map, used in tests and by embedding
//!   hosts without a filesystem.

mod file;
mod memory;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from the persistence boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file operation failed.
    #[error("file operation failed on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot encode/decode failed for key {key}: {source}")]
    Snapshot {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store refused the operation (unavailable, quota, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A record failed validation before being persisted.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl StorageError {
    pub(crate) fn file_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StorageError::FileIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn snapshot(key: impl Into<String>, source: serde_json::Error) -> Self {
        StorageError::Snapshot {
            key: key.into(),
            source,
        }
    }
}

/// Key-value storage for named snapshot blobs.
///
/// Absence is not an error: `read_blob` returns `None` for unknown keys and
/// `remove_blob` is a no-op when the key does not exist.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read_blob(&self, key: &str) -> StorageResult<Option<String>>;
    async fn write_blob(&self, key: &str, data: &str) -> StorageResult<()>;
    async fn remove_blob(&self, key: &str) -> StorageResult<()>;
}
