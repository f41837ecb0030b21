use std::sync::Arc;

use trackport_frame::AssemblyConfig;
use trackport_protocol::{EventSink, ProtocolRegistry};

use crate::buffer::{PassReport, RawBuffer};
use crate::config::ServerConfig;
use crate::registry::WorkerRegistry;

/// State shared by the listeners, connection workers and schedulers.
///
/// Built once at startup and passed around behind an `Arc`.
pub struct ServiceContext {
    config: ServerConfig,
    protocols: ProtocolRegistry,
    buffer: RawBuffer,
    workers: WorkerRegistry,
    sink: Arc<dyn EventSink>,
}

impl ServiceContext {
    /// Context with the built-in protocol variants.
    pub fn new(config: ServerConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_protocols(config, ProtocolRegistry::with_defaults(), sink)
    }

    pub fn with_protocols(
        config: ServerConfig,
        protocols: ProtocolRegistry,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            protocols,
            buffer: RawBuffer::new(),
            workers: WorkerRegistry::new(),
            sink,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn buffer(&self) -> &RawBuffer {
        &self.buffer
    }

    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    /// Reassembly limits for multi-chunk connections.
    pub fn assembly_config(&self) -> AssemblyConfig {
        AssemblyConfig {
            max_size: self.config.max_assembly_size,
            ..AssemblyConfig::default()
        }
    }

    /// One drain-and-parse cycle against this context's sink.
    pub fn parse_cycle(&self) -> Option<PassReport> {
        self.buffer.try_parse_cycle(&self.protocols, self.sink.as_ref())
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .field("protocols", &self.protocols)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}
