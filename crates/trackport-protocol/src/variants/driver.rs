use tracing::warn;

use crate::event::EventData;
use crate::fields;
use crate::parser::{ParserState, ProtocolParser, RecordHeader, Verdict};
use crate::range;
use crate::sink::EventSink;

use super::{base_event, store};

const V109_FIELDS: usize = 6;
const CONTINUATION: &str = "+";

/// Driver data as `name=value` pairs.
///
/// A trailing `+` field means the device will send another line on the same
/// connection.
#[derive(Debug, Default)]
pub struct V109 {
    state: ParserState,
}

impl V109 {
    pub fn boxed() -> Box<dyn ProtocolParser> {
        Box::<Self>::default()
    }
}

fn continues(header: &RecordHeader<'_>) -> bool {
    header.len() > V109_FIELDS && header.field(header.len() - 1).trim() == CONTINUATION
}

impl ProtocolParser for V109 {
    fn tag(&self) -> &'static str {
        "V109"
    }

    fn state(&self) -> &ParserState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ParserState {
        &mut self.state
    }

    fn validate(&mut self, buf: &[u8]) -> Verdict {
        match RecordHeader::read(buf, V109_FIELDS) {
            Some(header) => {
                let more = continues(&header);
                self.state.accept(&header).with_more_data(more)
            }
            None => self.state.reject(),
        }
    }

    fn parse(&mut self, buf: &[u8], sink: &dyn EventSink) -> Verdict {
        let Some(header) = RecordHeader::read(buf, V109_FIELDS) else {
            return self.state.reject();
        };
        let more = continues(&header);

        let mut event = base_event(&self.state, &header, self.tag());
        let driver = header.field(4).trim();
        if !driver.is_empty() {
            event.driver_id = Some(driver.to_owned());
        }
        event.creation_code = range::small_int(fields::int(header.field(5)));

        let mut pairs = header.tail(V109_FIELDS);
        if more {
            pairs.pop();
        }
        let mut data = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let Some((name, value)) = pair.split_once('=') else {
                warn!(pair, tracker = header.tracker_id(), "driver data field is not name=value");
                continue;
            };
            let value = value.trim();
            let mut row = EventData::for_event(&event, name.trim()).with_text(value);
            row.int_value = value.parse().ok();
            row.float_value = value.parse().ok();
            data.push(row);
        }

        store(sink, &event, &data).with_more_data(more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn trailing_plus_expects_more_lines() {
        let mut parser = V109::default();
        let verdict = parser.validate(b"TRK1,3,V109,02/01/2024 08:00:00,DRV42,9,pin=1234,+\r\n");
        assert!(verdict.ok);
        assert!(verdict.more_data_expected);

        let verdict = parser.validate(b"TRK1,4,V109,02/01/2024 08:00:01,DRV42,9,name=Ann");
        assert!(verdict.ok);
        assert!(!verdict.more_data_expected);
        assert_eq!(parser.ack_or_nack().as_ref(), b"ACK,V109,4\r\n");
    }

    #[test]
    fn parse_writes_pairs_as_event_data() {
        let sink = MemorySink::new();
        let mut parser = V109::default();
        let verdict = parser.parse(
            b"TRK1,3,V109,02/01/2024 08:00:00,DRV42,9,pin=1234,score=4.5,name=Ann,broken,+",
            &sink,
        );
        assert!(verdict.ok);
        assert!(verdict.more_data_expected);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].driver_id.as_deref(), Some("DRV42"));
        assert_eq!(events[0].creation_code, Some(9));

        let data = sink.event_data();
        assert_eq!(data.len(), 3);
        let (_, pin) = &data[0];
        assert_eq!(pin.name, "pin");
        assert_eq!(pin.int_value, Some(1234));
        assert_eq!(pin.driver_id.as_deref(), Some("DRV42"));
        let (_, score) = &data[1];
        assert_eq!(score.int_value, None);
        assert_eq!(score.float_value, Some(4.5));
        let (_, name) = &data[2];
        assert_eq!(name.text.as_deref(), Some("Ann"));
        assert_eq!(name.float_value, None);
    }

    #[test]
    fn empty_driver_is_null() {
        let sink = MemorySink::new();
        let mut parser = V109::default();
        assert!(parser.parse(b"TRK1,3,V109,x, ,9", &sink).ok);
        assert_eq!(sink.events()[0].driver_id, None);
    }
}
