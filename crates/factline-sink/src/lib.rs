//! Durable, at-least-once ingestion buffer: append-and-flush to a local
//! file, rotate into immutable batches on a timer, and upload asynchronously
//! to an [`factline_storage::ObjectStore`].

pub mod error;
pub mod paths;
pub mod sink;

pub use error::SinkError;
pub use sink::Sink;
