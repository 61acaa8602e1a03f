use async_trait::async_trait;
use bytes::Bytes;
use factline_core::Cancellation;
use opendal::{Operator, services};

use crate::error::StorageError;
use crate::retry::with_retry;
use crate::sanitize::sanitize_key;
use crate::store::ObjectStore;

/// An [`ObjectStore`] backed by an `opendal::Operator`. The same type serves
/// both backends named in the spec; `local` only gates the extra key
/// sanitization pass the filesystem backend needs.
pub struct OpenDalStore {
    operator: Operator,
    cancel: Cancellation,
    local: bool,
}

impl OpenDalStore {
    pub fn new_fs(base_dir: &str, cancel: Cancellation) -> Result<Self, StorageError> {
        let builder = services::Fs::default().root(base_dir);
        let operator = Operator::new(builder)?.finish();
        Ok(Self {
            operator,
            cancel,
            local: true,
        })
    }

    pub fn new_s3(
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        cancel: Cancellation,
    ) -> Result<Self, StorageError> {
        let builder = services::S3::default()
            .endpoint(endpoint)
            .region(region)
            .bucket(bucket)
            .access_key_id(access_key)
            .secret_access_key(secret_key);
        let operator = Operator::new(builder)?.finish();
        Ok(Self {
            operator,
            cancel,
            local: false,
        })
    }

    fn resolve(&self, key: &str) -> Result<String, StorageError> {
        if self.local {
            sanitize_key(key)
        } else {
            Ok(key.to_string())
        }
    }
}

#[async_trait]
impl ObjectStore for OpenDalStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let key = self.resolve(key)?;
        with_retry(&self.cancel, || {
            let key = key.clone();
            let bytes = bytes.clone();
            async move {
                self.operator
                    .write(&key, bytes)
                    .await
                    .map(|_| ())
                    .map_err(Into::into)
            }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let key = self.resolve(key)?;
        with_retry(&self.cancel, || {
            let key = key.clone();
            async move {
                match self.operator.read(&key).await {
                    Ok(buf) => Ok(buf.to_bytes()),
                    Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                        Err(StorageError::NotFound(key.clone()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = self.resolve(key)?;
        with_retry(&self.cancel, || {
            let key = key.clone();
            async move { self.operator.delete(&key).await.map_err(Into::into) }
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let key = self.resolve(key)?;
        with_retry(&self.cancel, || {
            let key = key.clone();
            async move {
                match self.operator.stat(&key).await {
                    Ok(_) => Ok(true),
                    Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = self.resolve(prefix)?;
        with_retry(&self.cancel, || {
            let prefix = prefix.clone();
            async move {
                let entries = self.operator.list(&prefix).await?;
                Ok(entries
                    .into_iter()
                    .filter(|e| !e.path().ends_with('/'))
                    .map(|e| e.path().to_string())
                    .collect())
            }
        })
        .await
    }
}
