/// Errors that can occur while assembling frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A multi-chunk transfer grew past the configured bound.
    #[error("assembled frame too large ({size} bytes, max {max})")]
    AssemblyOverflow { size: usize, max: usize },

    /// A chunk arrived after the transfer was already complete.
    #[error("chunk received after transfer completed")]
    AlreadyComplete,
}

pub type Result<T> = std::result::Result<T, FrameError>;
