use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;

/// Operations common to both backends. Implementations own retry and key
/// sanitization internally; callers never branch on which backend is live.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads with replace semantics. Retried on transient failure.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;

    /// Fails with [`StorageError::NotFound`] if the key is absent.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Idempotent: deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Distinguishes present / absent / error.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Order is unspecified; pagination is handled internally.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
