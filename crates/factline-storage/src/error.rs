/// Errors surfaced by an [`crate::ObjectStore`] implementation.
///
/// `NotFound` and `InvalidKey` are terminal: the retry wrapper never retries
/// them. Everything else is treated as transient and retried per the backoff
/// policy in [`crate::retry`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("object store backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Terminal errors are never retried, even if retry budget remains.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidKey { .. } | StorageError::Cancelled
        )
    }
}
