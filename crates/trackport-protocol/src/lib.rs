//! Tracker protocol parsers and the contract they write against.
//!
//! Every device record carries a protocol tag in its third comma-separated
//! field. The [`ProtocolRegistry`] maps that tag to a parser constructor; each
//! [`ProtocolParser`] validates a frame cheaply at receive time, produces the
//! ACK/NACK for the device, and later decodes the frame into
//! [`TrackerEvent`]s handed to an [`EventSink`].
//!
//! Field decoding is deliberately tolerant: see [`fields`] and [`range`].

pub mod event;
pub mod fields;
pub mod parser;
pub mod range;
pub mod registry;
pub mod sink;
pub mod variants;

pub use event::{AdditionalData, EventData, EventId, ParseLog, TrackerEvent};
pub use parser::{ParserState, ProtocolParser, RecordHeader, Verdict, DEFAULT_TIMEOUT};
pub use registry::{ParserConstructor, ProtocolRegistry};
pub use sink::{EventSink, MemorySink};
