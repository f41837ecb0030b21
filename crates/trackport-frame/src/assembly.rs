use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// A transfer is complete after more than this many consecutive empty reads.
///
/// Multi-chunk devices carry no length header and no end marker; the only
/// end-of-transfer signal is the peer going quiet.
pub const EMPTY_READS_BEFORE_COMPLETE: u32 = 10;

const DEFAULT_INITIAL_CAPACITY: usize = 32 * 1024;
const DEFAULT_MAX_ASSEMBLY: usize = 1024 * 1024;

/// Configuration for multi-chunk reassembly.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Capacity reserved when a transfer starts. Default: 32 KiB.
    pub initial_capacity: usize,
    /// Largest transfer accepted before the connection is dropped. Default: 1 MiB.
    pub max_size: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_size: DEFAULT_MAX_ASSEMBLY,
        }
    }
}

/// Result of feeding one read into the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyProgress {
    /// Keep receiving.
    NeedMore,
    /// The transfer is complete; take the bytes with [`ChunkAssembler::finish`].
    Complete,
}

/// Stitches the reads of one multi-chunk transfer into a contiguous buffer.
///
/// Every chunk is appended at the cursor, so the assembled bytes are the
/// exact concatenation of the non-empty reads in arrival order.
#[derive(Debug)]
pub struct ChunkAssembler {
    buf: BytesMut,
    empty_reads: u32,
    complete: bool,
    config: AssemblyConfig,
}

impl ChunkAssembler {
    /// Start a new transfer with default configuration.
    pub fn new() -> Self {
        Self::with_config(AssemblyConfig::default())
    }

    /// Start a new transfer with explicit configuration.
    pub fn with_config(config: AssemblyConfig) -> Self {
        let capacity = config.initial_capacity.min(config.max_size);
        Self {
            buf: BytesMut::with_capacity(capacity),
            empty_reads: 0,
            complete: false,
            config,
        }
    }

    /// Feed the bytes of one read. An empty slice is a zero-length read.
    pub fn push(&mut self, chunk: &[u8]) -> Result<AssemblyProgress> {
        if self.complete {
            return Err(FrameError::AlreadyComplete);
        }

        if chunk.is_empty() {
            self.empty_reads += 1;
            if self.empty_reads > EMPTY_READS_BEFORE_COMPLETE {
                self.complete = true;
                return Ok(AssemblyProgress::Complete);
            }
            return Ok(AssemblyProgress::NeedMore);
        }

        self.empty_reads = 0;
        let size = self.buf.len() + chunk.len();
        if size > self.config.max_size {
            return Err(FrameError::AssemblyOverflow {
                size,
                max: self.config.max_size,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(AssemblyProgress::NeedMore)
    }

    /// Bytes assembled so far.
    pub fn assembled(&self) -> &[u8] {
        &self.buf
    }

    /// Write position of the next chunk.
    pub fn cursor(&self) -> usize {
        self.buf.len()
    }

    /// Consecutive empty reads seen since the last data.
    pub fn empty_reads(&self) -> u32 {
        self.empty_reads
    }

    /// Whether the end-of-transfer condition has been reached.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Consume the assembler and return the assembled transfer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}
