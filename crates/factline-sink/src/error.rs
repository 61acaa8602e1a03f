/// Errors surfaced by [`crate::Sink::write`]. A failure here means the
/// caller's record was never acknowledged as durable.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("could not create buffer directory {path}: {source}")]
    BufferDirUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not open active buffer file {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("write or flush to active buffer failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}
