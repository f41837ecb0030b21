use crate::fields;
use crate::parser::{ParserState, ProtocolParser, RecordHeader, Verdict};
use crate::range;
use crate::sink::EventSink;

use super::{base_event, store, tag_code};

const V141_FIELDS: usize = 13;

/// Trip accumulators: odometers, distance, fuel and status bytes.
#[derive(Debug, Default)]
pub struct V141 {
    state: ParserState,
}

impl V141 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

impl ProtocolParser for V141 {
    fn tag(&self) -> &'static str {
        "V141"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V141_FIELDS) {
            Some(header) => self.state.accept(&header),
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V141_FIELDS) else {
            return self.state.reject();
        };
        let mut event = base_event(&self.state, &header, self.tag());
        event.creation_code = tag_code(self.tag());
        event.odometer_gps = fields::int(header.field(4));
        event.odometer_road = fields::int(header.field(5));
        event.odometer_dash = fields::int(header.field(6));
        event.trip_distance = fields::int(header.field(7));
        event.max_speed = range::small_int(fields::int(header.field(8)));
        event.fuel_level = range::tiny_int(fields::int(header.field(9)));
        event.tacho_status = Some(fields::byte_hex(header.field(10)));
        event.can_status = Some(fields::byte_hex(header.field(11)));
        event.hardware_status = Some(fields::byte_hex(header.field(12)));
        store(sink, &event, &[])
    }
}
