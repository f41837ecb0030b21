//! TCP transport for tracker ingestion.
//!
//! Binds listening sockets with an explicit pending-connection backlog,
//! tunes accepted streams, and classifies socket errors into "normal
//! teardown" versus failures worth reporting.
//!
//! This is the lowest layer of trackport. The server builds its accept
//! loops and connection workers on top of [`TcpEndpoint`].

pub mod classify;
pub mod error;
pub mod tcp;

pub use classify::{classify_accept_error, is_teardown_error, AcceptDisposition};
pub use error::{Result, TransportError};
pub use tcp::TcpEndpoint;
