//! Object storage for uploaded images
//!
//! Objects get a random UUID key plus an extension derived from their MIME
//! type, and are served back under the configured public URL prefix.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::StorageConfig;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File type not allowed: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Empty file")]
    Empty,

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes`, returning where they can be fetched from
    async fn put(&self, bytes: &[u8], mime_type: &str) -> Result<StoredObject, StorageError>;

    /// Remove an object; missing objects are not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// The key of an object given its public URL, if this storage serves it
    fn key_from_url(&self, url: &str) -> Option<String>;
}

/// Stores objects as files in a local directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
    max_file_size: u64,
    config: StorageConfig,
}

impl LocalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.path.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
            max_file_size: config.max_file_size,
            config: config.clone(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

/// Keys are flat file names we generated: no separators or parent references
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, bytes: &[u8], mime_type: &str) -> Result<StoredObject, StorageError> {
        if !self.config.is_type_allowed(mime_type) {
            return Err(StorageError::UnsupportedType(mime_type.to_string()));
        }
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(StorageError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let key = format!("{}.{}", Uuid::new_v4(), self.config.extension_for(mime_type));
        tokio::fs::write(self.root.join(&key), bytes).await?;

        tracing::info!(key = %key, size, mime = mime_type, "Stored object");
        Ok(StoredObject {
            url: format!("{}/{}", self.public_url, key),
            key,
            size,
            content_type: mime_type.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_url)?.strip_prefix('/')?;
        is_valid_key(key).then(|| key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(&StorageConfig {
            path: dir.path().join("uploads"),
            max_file_size: 16,
            ..StorageConfig::default()
        })
    }

    #[tokio::test]
    async fn test_put_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let object = storage.put(PNG, "image/png").await.unwrap();
        assert!(object.key.ends_with(".png"));
        assert_eq!(object.url, format!("/uploads/{}", object.key));
        assert_eq!(object.size, PNG.len() as u64);

        let path = storage.root().join(&object.key);
        assert_eq!(std::fs::read(&path).unwrap(), PNG);

        storage.delete(&object.key).await.unwrap();
        assert!(!path.exists());
        // Deleting again is fine
        storage.delete(&object.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_validation() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        assert!(matches!(
            storage.put(b"hello", "text/plain").await,
            Err(StorageError::UnsupportedType(_))
        ));
        assert!(matches!(
            storage.put(&[], "image/png").await,
            Err(StorageError::Empty)
        ));
        assert!(matches!(
            storage.put(&[0u8; 17], "image/png").await,
            Err(StorageError::TooLarge { size: 17, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        assert!(matches!(
            storage.delete("../secret").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_from_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        assert_eq!(
            storage.key_from_url("/uploads/abc-123.png"),
            Some("abc-123.png".to_string())
        );
        assert_eq!(storage.key_from_url("https://cdn.example.com/a.png"), None);
        assert_eq!(storage.key_from_url("/uploads/../etc/passwd"), None);
        assert_eq!(storage.key_from_url("/uploads/"), None);
    }
}
