/// Errors that can occur while running the ingestion service.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error, including listener bind failures.
    #[error("transport error: {0}")]
    Transport(#[from] trackport_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] trackport_frame::FrameError),

    /// Configuration rejected before startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
