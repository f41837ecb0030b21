//! Tracker ingestion service.
//!
//! Accepts device connections on one or more TCP ports, runs one
//! [`ConnectionWorker`] per connection to classify, validate and acknowledge
//! frames, and queues valid frames in a [`RawBuffer`]. A scheduler drains the
//! buffer on a fixed interval and parses the frames into events for the
//! configured [`EventSink`](trackport_protocol::EventSink).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use trackport_protocol::MemorySink;
//! use trackport_server::{ServerConfig, Service, ServiceContext};
//!
//! # async fn run() -> trackport_server::Result<()> {
//! let ctx = ServiceContext::new(ServerConfig::default(), Arc::new(MemorySink::new()));
//! let service = Service::start(Arc::new(ctx))?;
//! tokio::signal::ctrl_c().await.ok();
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod worker;

pub use buffer::{BufferStats, PassReport, RawBuffer};
pub use config::ServerConfig;
pub use context::ServiceContext;
pub use error::{Result, ServerError};
pub use registry::{ConnectionId, WorkerRegistry};
pub use service::{Service, ShutdownReport};
pub use worker::{ConnectionWorker, WorkerHandle};
