use bytes::Bytes;

/// One logical unit of device data waiting to be parsed.
///
/// The payload is immutable once the frame is created; only the parse
/// bookkeeping changes while the frame moves through the parse pipeline.
#[derive(Debug, Clone)]
pub struct RawFrame {
    payload: Bytes,
    tracker_id: Option<String>,
    /// Set by the parse pass when the protocol parser accepted the frame.
    pub parsed_ok: bool,
    /// Number of failed parse attempts.
    pub parse_retry_count: u32,
}

impl RawFrame {
    /// Create a new frame from a completed receive or reassembly.
    pub fn new(payload: impl Into<Bytes>, tracker_id: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            tracker_id,
            parsed_ok: false,
            parse_retry_count: 0,
        }
    }

    /// The frame bytes. The slice length is the valid length.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of valid bytes in the frame.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Originating device, when the receiving connection knew it.
    pub fn tracker_id(&self) -> Option<&str> {
        self.tracker_id.as_deref()
    }

    /// Record the outcome of one parse attempt.
    pub fn record_parse(&mut self, ok: bool) {
        self.parsed_ok = ok;
        if !ok {
            self.parse_retry_count = self.parse_retry_count.saturating_add(1);
        }
    }
}
