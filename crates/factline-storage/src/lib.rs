//! The unified object store abstraction both the ingestion sink and the
//! rollup engine depend on: one trait, two backends (local filesystem and
//! S3-compatible), so higher layers never branch on which is configured.

pub mod error;
pub mod opendal_store;
pub mod retry;
pub mod sanitize;
pub mod store;

pub use error::StorageError;
pub use opendal_store::OpenDalStore;
pub use store::ObjectStore;
