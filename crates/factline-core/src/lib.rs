//! Domain types and validation shared by the ingestion and rollup binaries.
//!
//! Record shapes (`RequestFact`, `ServiceEvent`) and the topic they belong to
//! are defined here so the Sink, the HTTP handlers, and the rollup engine all
//! validate and serialize against the same rules.

pub mod cancel;
pub mod record;
pub mod topic;
pub mod validate;

pub use cancel::Cancellation;
pub use record::{RequestFact, ServiceEvent};
pub use topic::Topic;
pub use validate::ValidationError;
