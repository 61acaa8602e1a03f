use thiserror::Error;

/// Errors surfaced by a rollup invocation. Every variant maps to a non-zero
/// exit code at the binary boundary; none of them leave partial output in
/// place (the output-swap protocol only commits after a successful encode).
#[derive(Debug, Error)]
pub enum RollupError {
    #[error("rollup already running: lock held at {path}")]
    AlreadyRunning { path: String },

    #[error("lock file I/O error at {path}: {source}")]
    LockIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error: {0}")]
    Storage(#[from] factline_storage::StorageError),

    #[error("failed to encode parquet output: {0}")]
    Encode(#[source] anyhow::Error),
}
