//! Filesystem object store

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

use super::object_store::ObjectStore;

/// Object store keeping each object as a file in one directory
pub struct LocalObjectStore {
    /// Directory holding the objects
    storage_dir: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local object store
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage_dir = storage_dir.into();
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Resolve an object name to its file, rejecting anything that could escape the directory
    fn object_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.contains('\0')
        {
            return Err(Error::storage(format!("Invalid object name: {}", name)));
        }
        Ok(self.storage_dir.join(name))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn ensure_bucket(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        Ok(())
    }

    async fn put(&self, name: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.object_path(name)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::storage(format!("Failed to write {}: {}", name, e)))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("File not found in storage"))
            }
            Err(e) => Err(Error::storage(format!("Failed to read {}: {}", name, e))),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.object_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(format!("Failed to delete {}: {}", name, e))),
        }
    }

    async fn presigned_get_url(&self, _name: &str, _expiry: Duration) -> Result<Option<String>> {
        Ok(None)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.storage_dir.is_dir())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, store) = store();
        store
            .put("a.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(store.get("a.pdf").await.unwrap(), b"%PDF-1.4");
        assert!(store.delete("a.pdf").await.unwrap());
        assert!(!store.delete("a.pdf").await.unwrap());
        assert!(matches!(store.get("a.pdf").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let (_dir, store) = store();
        for name in ["../x.pdf", "sub/x.pdf", "..", "a\\b", ""] {
            assert!(store.put(name, vec![1], "application/pdf").await.is_err());
        }
    }

    #[tokio::test]
    async fn test_no_presigned_urls() {
        let (_dir, store) = store();
        assert!(store
            .presigned_get_url("a.pdf", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());
        assert!(store.health_check().await.unwrap());
    }
}
