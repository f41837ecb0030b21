use crate::event::TrackerEvent;
use crate::fields;
use crate::parser::{ParserState, ProtocolParser, RecordHeader, Verdict};
use crate::range;
use crate::sink::EventSink;

use super::{base_event, store};

const V100_FIELDS: usize = 10;
const V101_FIELDS: usize = 22;

fn fill_position(event: &mut TrackerEvent, header: &RecordHeader<'_>) {
    event.latitude = fields::double(header.field(4));
    event.longitude = fields::double(header.field(5));
    event.heading = range::small_int(fields::int(header.field(6)));
    event.speed = range::small_int(fields::int(header.field(7)));
    event.creation_code = range::small_int(fields::int(header.field(8)));
    event.digitals = Some(fields::byte_hex(header.field(9)));
}

/// Position report.
#[derive(Debug, Default)]
pub struct V100 {
    state: ParserState,
}

impl V100 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V100 {
    fn tag(&self) -> &'static str {
        "V100"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V100_FIELDS) {
            Some(header) => self.state.accept(&header),
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V100_FIELDS) else {
            return self.state.reject();
        };
        let mut event = base_event(&self.state, &header, self.tag());
        fill_position(&mut event, &header);
        store(sink, &event, &[])
    }
}

/// Extended position report: V100 plus vehicle telemetry.
#[derive(Debug, Default)]
pub struct V101 {
    state: ParserState,
}

impl V101 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V101 {
    fn tag(&self) -> &'static str {
        "V101"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V101_FIELDS) {
            Some(header) => self.state.accept(&header),
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V101_FIELDS) else {
            return self.state.reject();
        };
        let mut event = base_event(&self.state, &header, self.tag());
        fill_position(&mut event, &header);
        event.altitude = range::small_int(fields::int(header.field(10)));
        event.satellites = range::tiny_int(fields::int(header.field(11)));
        event.signal_strength = range::tiny_int(fields::int(header.field(12)));
        event.system_status = Some(fields::byte_hex(header.field(13)));
        event.battery_level = range::tiny_int(fields::int(header.field(14)));
        event.external_voltage = range::tiny_int(fields::int(header.field(15)));
        for (slot, field) in event.analogs.iter_mut().zip(16..22) {
            *slot = fields::short(header.field(field));
        }
        store(sink, &event, &[])
    }
}
