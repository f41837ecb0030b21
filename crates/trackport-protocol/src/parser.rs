use std::borrow::Cow;
use std::ops::Range;
use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDateTime;
use trackport_frame::{leading_text, split_fields};

use crate::fields;
use crate::sink::EventSink;

/// Inactivity timeout a parser reports when it has no opinion.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Outcome of validating or parsing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    /// The device will send further lines on this connection.
    pub more_data_expected: bool,
}

impl Verdict {
    pub const fn accepted() -> Self {
        Self {
            ok: true,
            more_data_expected: false,
        }
    }

    pub const fn rejected() -> Self {
        Self {
            ok: false,
            more_data_expected: false,
        }
    }

    pub const fn with_more_data(mut self, more: bool) -> Self {
        self.more_data_expected = more;
        self
    }
}

/// One protocol variant.
///
/// A fresh instance is constructed per connection at classification time and
/// another per frame at parse time, so state never crosses connections.
/// `validate` runs on the receive path and must stay cheap; `parse` runs on
/// the parse pass and writes to the sink.
pub trait ProtocolParser: Send {
    /// Upper-case protocol tag, e.g. `V100`.
    fn tag(&self) -> &'static str;

    fn state(&self) -> &ParserState;

    fn state_mut(&mut self) -> &mut ParserState;

    /// Structurally check a frame and record its ACK.
    fn validate(&mut self, buf: &[u8]) -> Verdict;

    /// Decode a frame and write its events.
    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict;

    /// Connection stays open across many frames, each ACKed.
    fn is_continuous(&self) -> bool {
        false
    }

    /// One transfer is split across many reads with no framing.
    fn is_multi_chunk(&self) -> bool {
        false
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn tracker_id(&self) -> Option<&str> {
        self.state().tracker_id()
    }

    fn set_tracker_id(&mut self, tracker_id: Option<String>) {
        self.state_mut().set_tracker_id(tracker_id);
    }

    /// Bytes to write back for the last validated frame.
    fn ack_or_nack(&self) -> Bytes {
        self.state().ack_bytes(self.tag())
    }
}

/// State every variant carries: the tracker id and the last verdict.
#[derive(Debug, Clone, Default)]
pub struct ParserState {
    tracker_id: Option<String>,
    acked_sequence: Option<u32>,
}

impl ParserState {
    pub fn tracker_id(&self) -> Option<&str> {
        self.tracker_id.as_deref()
    }

    pub fn set_tracker_id(&mut self, tracker_id: Option<String>) {
        self.tracker_id = tracker_id;
    }

    /// Record a valid frame: remember its tracker and sequence.
    pub fn accept(&mut self, header: &RecordHeader<'_>) -> Verdict {
        self.tracker_id = Some(header.tracker_id().to_owned());
        self.acked_sequence = Some(header.sequence);
        Verdict::accepted()
    }

    /// Record an invalid frame. The tracker id survives.
    pub fn reject(&mut self) -> Verdict {
        self.acked_sequence = None;
        Verdict::rejected()
    }

    /// `ACK,<TAG>,<seq>\r\n` after an accepted frame, `NACK,<TAG>\r\n` otherwise.
    pub fn ack_bytes(&self, tag: &str) -> Bytes {
        match self.acked_sequence {
            Some(seq) => Bytes::from(format!("ACK,{tag},{seq}\r\n")),
            None => Bytes::from(format!("NACK,{tag}\r\n")),
        }
    }
}

/// The four leading fields every record shares, plus the rest of the line.
#[derive(Debug, Clone)]
pub struct RecordHeader<'a> {
    text: Cow<'a, str>,
    spans: Vec<Range<usize>>,
    pub sequence: u32,
}

impl<'a> RecordHeader<'a> {
    /// Read the text portion of `buf`. `None` when the record has fewer than
    /// `min_fields` fields, an empty tracker id, or a non-numeric sequence.
    pub fn read(buf: &'a [u8], min_fields: usize) -> Option<Self> {
        let text = leading_text(buf)?;
        let record = text.trim_end_matches(['\r', '\n']);
        let mut start = 0;
        let spans: Vec<Range<usize>> = split_fields(record)
            .iter()
            .map(|field| {
                let span = start..start + field.len();
                start = span.end + 1;
                span
            })
            .collect();
        if spans.len() < min_fields.max(4) {
            return None;
        }
        if record[spans[0].clone()].trim().is_empty() {
            return None;
        }
        let sequence = record[spans[1].clone()].trim().parse().ok()?;
        Some(Self {
            text,
            spans,
            sequence,
        })
    }

    pub fn tracker_id(&self) -> &str {
        self.field(0).trim()
    }

    pub fn tag(&self) -> &str {
        self.field(2)
    }

    /// Field `index`, or an empty string past the end.
    pub fn field(&self, index: usize) -> &str {
        self.spans
            .get(index)
            .and_then(|span| self.text.get(span.clone()))
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Fields after the header, from `start`.
    pub fn tail(&self, start: usize) -> Vec<&str> {
        (start..self.len()).map(|index| self.field(index)).collect()
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        fields::datetime(self.field(3))
    }
}
