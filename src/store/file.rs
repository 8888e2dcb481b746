//! File-backed blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{BlobStore, StorageError, StorageResult};

/// Blob store that keeps one JSON file per key inside a base directory.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

/// Write data to a temp file, fsync it, then atomically rename to the final
/// path.
///
/// The temp file name is generated internally using a ULID to avoid collisions
/// from concurrent writers targeting the same final path.
async fn atomic_write_file(final_path: &Path, data: &[u8]) -> StorageResult<()> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let temp_path = final_path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| StorageError::file_io(&temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StorageError::file_io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::file_io(&temp_path, e))?;
    fs::rename(&temp_path, final_path)
        .await
        .map_err(|e| StorageError::file_io(final_path, e))?;
    Ok(())
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn read_blob(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }

    async fn write_blob(&self, key: &str, data: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::file_io(&self.dir, e))?;
        atomic_write_file(&self.path_for(key), data.as_bytes()).await
    }

    async fn remove_blob(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        store.write_blob("configs", r#"[{"id":"a"}]"#).await.unwrap();
        let data = store.read_blob("configs").await.unwrap();
        assert_eq!(data.as_deref(), Some(r#"[{"id":"a"}]"#));
    }

    #[tokio::test]
    async fn read_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        assert!(store.read_blob("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_replaces_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        store.write_blob("prices", "v1").await.unwrap();
        store.write_blob("prices", "v2").await.unwrap();
        assert_eq!(store.read_blob("prices").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path());

        store.write_blob("selected", "[]").await.unwrap();
        store.remove_blob("selected").await.unwrap();
        store.remove_blob("selected").await.unwrap();
        assert!(store.read_blob("selected").await.unwrap().is_none());
    }
}
