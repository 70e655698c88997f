/// Uploaded file storage
///
/// Asset keys come from [`crate::models::file_asset`] (`{workspace_id}/{hex}-{name}`
/// or `user-{hex}-{name}`). Bytes are written to a temporary file and renamed
/// into place so readers never observe a partial upload.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File size limit is 5MB")]
    TooLarge { size: usize, limit: usize },

    #[error("asset not found")]
    NotFound,

    #[error("invalid asset key")]
    InvalidKey,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Rejects uploads above `limit` bytes
pub fn check_size(size: usize, limit: usize) -> Result<(), StorageError> {
    if size > limit {
        return Err(StorageError::TooLarge { size, limit });
    }
    Ok(())
}

#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Returns false when nothing was stored under `key`
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.len() > 512 {
        return Err(StorageError::InvalidKey);
    }
    let normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !normal {
        return Err(StorageError::InvalidKey);
    }
    Ok(())
}

/// Filesystem-backed storage rooted at a directory
pub struct LocalAssetStorage {
    root: PathBuf,
}

impl LocalAssetStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(".tmp").join(Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl AssetStorage for LocalAssetStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let final_path = self.path(key)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(&data).await?;
        temp_file.sync_all().await?;

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, &final_path).await?;

        tracing::debug!(key = %key, size = data.len(), "Asset stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path(key)?;
        let data = fs::read(&path).await.map_err(StorageError::from_io)?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryAssetStorage {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryAssetStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetStorage for MemoryAssetStorage {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.objects.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_size() {
        assert!(check_size(MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES).is_ok());

        let err = check_size(MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES).unwrap_err();
        assert_eq!(err.to_string(), "File size limit is 5MB");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("8b0c/abc-report.pdf").is_ok());
        assert!(validate_key("user-abc-avatar.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/./b").is_ok());
    }

    #[tokio::test]
    async fn test_local_put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalAssetStorage::new(temp_dir.path());
        let key = "ws/0123-notes.txt";

        storage.put(key, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(storage.get(key).await.unwrap(), Bytes::from_static(b"hello"));

        assert!(storage.delete(key).await.unwrap());
        assert!(!storage.delete(key).await.unwrap());
        assert!(matches!(storage.get(key).await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn test_local_put_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalAssetStorage::new(temp_dir.path());

        storage.put("k", Bytes::from_static(b"one")).await.unwrap();
        storage.put("k", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryAssetStorage::new();
        storage.put("a/b", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(storage.get("a/b").await.unwrap().len(), 1);
        assert!(storage.delete("a/b").await.unwrap());
        assert!(matches!(storage.get("a/b").await, Err(StorageError::NotFound)));
    }
}
