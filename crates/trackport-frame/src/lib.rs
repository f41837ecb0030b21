//! Raw tracker frames and their reassembly.
//!
//! Devices speak an ASCII, comma-delimited record, optionally NUL-terminated
//! and followed by binary data. There is no length prefix on the wire:
//! - single-shot devices send one record per connection
//! - continuous devices send many short records on one connection
//! - multi-chunk devices split one large transfer across many reads and
//!   signal the end only by going quiet
//!
//! This crate owns the byte-level pieces: the [`RawFrame`] handed to the parse
//! pipeline, the leading-record text extraction used for dispatch, and the
//! [`ChunkAssembler`] that stitches multi-chunk transfers together.

pub mod assembly;
pub mod error;
pub mod raw;
pub mod text;

pub use assembly::{AssemblyConfig, AssemblyProgress, ChunkAssembler, EMPTY_READS_BEFORE_COMPLETE};
pub use error::{FrameError, Result};
pub use raw::RawFrame;
pub use text::{leading_text, split_fields, MIN_FRAME_LEN};
