//! In-memory blob store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, StorageError, StorageResult};

/// Blob store backed by a process-local map.
///
/// Write failures can be injected with [`MemoryBlobStore::set_fail_writes`] to
/// exercise persistence error paths in tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write_blob` fail with `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read_blob(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn write_blob(&self, key: &str, data: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        self.blobs
            .write()
            .await
            .insert(key.to_string(), data.to_string());
        Ok(())
    }

    async fn remove_blob(&self, key: &str) -> StorageResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
