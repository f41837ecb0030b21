//! TCP ingestion server for vehicle and camera tracking devices.
//!
//! trackport accepts device connections, classifies each frame by the
//! protocol tag embedded in its leading record, acknowledges it, and parses
//! buffered frames into events for a pluggable sink.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener binding and socket error classification
//! - [`frame`]: Raw frames, leading-record extraction, multi-chunk reassembly
//! - [`protocol`]: Protocol parsers, tag dispatch and the event sink contract
//! - [`server`]: Connection workers, raw buffer and parse scheduling (behind `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use trackport_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use trackport_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use trackport_protocol::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use trackport_server::*;
}
