use std::net::SocketAddr;

/// Errors that can occur in TCP transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind or listen on the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on a connected stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backlog cannot be zero.
    #[error("invalid accept backlog: {0}")]
    InvalidBacklog(u32),
}

pub type Result<T> = std::result::Result<T, TransportError>;
