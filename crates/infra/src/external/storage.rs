use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use bizdesk_core::TenantId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub content_type: String,
}

/// Tenant-partitioned blob storage. Keys are relative, `/`-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        tenant_id: TenantId,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Vec<u8>, StorageError>;
}

#[async_trait]
impl<T> ObjectStore for Arc<T>
where
    T: ObjectStore + ?Sized,
{
    async fn put(
        &self,
        tenant_id: TenantId,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        (**self).put(tenant_id, key, bytes, content_type).await
    }

    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).get(tenant_id, key).await
    }
}

/// Reject absolute paths, empty segments and traversal.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<(TenantId, String), (Vec<u8>, String)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        tenant_id: TenantId,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let size = bytes.len() as u64;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::Io("object store lock poisoned".to_string()))?;
        objects.insert((tenant_id, key.to_string()), (bytes, content_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::Io("object store lock poisoned".to_string()))?;
        objects
            .get(&(tenant_id, key.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Files under `root/<tenant_id>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    root: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, tenant_id: TenantId, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        let mut path = self.root.join(tenant_id.to_string());
        path.extend(key.split('/'));
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    #[tracing::instrument(skip(self, bytes), fields(tenant_id = %tenant_id, size = bytes.len()))]
    async fn put(
        &self,
        tenant_id: TenantId,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = self.path_for(tenant_id, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let size = bytes.len() as u64;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(StoredObject {
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn get(&self, tenant_id: TenantId, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(tenant_id, key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_cannot_escape_the_tenant_root() {
        for key in ["", "/etc/passwd", "a/../b", "a//b", "a\\b", "./a"] {
            assert!(validate_key(key).is_err(), "{key} should be rejected");
        }
        assert!(validate_key("documents/invoice/invoice-INV-00001.pdf").is_ok());
    }

    #[tokio::test]
    async fn in_memory_objects_are_tenant_scoped() {
        let store = InMemoryObjectStore::new();
        let a = TenantId::new();
        let b = TenantId::new();

        let stored = store.put(a, "docs/x.pdf", vec![1, 2, 3], "application/pdf").await.unwrap();
        assert_eq!(stored.size, 3);
        assert_eq!(store.get(a, "docs/x.pdf").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.get(b, "docs/x.pdf").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn local_fs_round_trip() {
        let root = std::env::temp_dir().join(format!("bizdesk-store-{}", uuid::Uuid::now_v7()));
        let store = LocalFsObjectStore::new(&root);
        let t = TenantId::new();

        store.put(t, "documents/quote/q.pdf", b"%PDF".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(store.get(t, "documents/quote/q.pdf").await.unwrap(), b"%PDF".to_vec());
        assert!(root.join(t.to_string()).join("documents").join("quote").join("q.pdf").exists());
        assert!(matches!(
            store.get(t, "documents/quote/missing.pdf").await,
            Err(StorageError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&root);
    }
}
