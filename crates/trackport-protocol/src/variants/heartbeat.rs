//! Continuous variants: the device holds the connection open and sends one
//! record per interval, each ACKed.

use std::time::Duration;

use crate::event::EventData;
use crate::fields;
use crate::parser::{ParserState, ProtocolParser, RecordHeader, Verdict};
use crate::range;
use crate::sink::EventSink;

use super::{base_event, store, tag_code};

const V114_FIELDS: usize = 7;
const V201_FIELDS: usize = 7;
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(300);

/// Position heartbeat.
#[derive(Debug, Default)]
pub struct V114 {
    state: ParserState,
}

impl V114 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V114 {
    fn tag(&self) -> &'static str {
        "V114"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn is_continuous(&self) -> bool {
        true
    }

    fn default_timeout(&self) -> Duration {
        HEARTBEAT_TIMEOUT
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V114_FIELDS) {
            Some(header) => self.state.accept(&header),
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V114_FIELDS) else {
            return self.state.reject();
        };
        let mut event = base_event(&self.state, &header, self.tag());
        event.creation_code = tag_code(self.tag());
        event.latitude = fields::double(header.field(4));
        event.longitude = fields::double(header.field(5));
        event.speed = range::small_int(fields::int(header.field(6)));
        store(sink, &event, &[])
    }
}

/// Camera health heartbeat.
#[derive(Debug, Default)]
pub struct V201 {
    state: ParserState,
}

impl V201 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V201 {
    fn tag(&self) -> &'static str {
        "V201"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn is_continuous(&self) -> bool {
        true
    }

    fn default_timeout(&self) -> Duration {
        HEARTBEAT_TIMEOUT
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V201_FIELDS) {
            Some(header) => self.state.accept(&header),
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V201_FIELDS) else {
            return self.state.reject();
        };
        let mut event = base_event(&self.state, &header, self.tag());
        event.creation_code = tag_code(self.tag());

        let data = [
            EventData::for_event(&event, "CameraCount").with_int(fields::int(header.field(4))),
            EventData::for_event(&event, "CameraStatus")
                .with_int(i32::from(fields::byte_hex(header.field(5)))),
            EventData::for_event(&event, "StoragePercent")
                .with_float(fields::double(header.field(6))),
        ];
        store(sink, &event, &data)
    }
}
