//! Built-in protocol variants.
//!
//! | Tag  | Shape        | Content                         |
//! |------|--------------|---------------------------------|
//! | V100 | single-shot  | position report                 |
//! | V101 | single-shot  | extended position report        |
//! | V109 | single-shot  | driver data, may span lines     |
//! | V114 | continuous   | position heartbeat              |
//! | V141 | single-shot  | trip accumulators               |
//! | V201 | continuous   | camera health                   |
//! | V204 | single-shot  | camera clip notification        |
//! | V210 | multi-chunk  | binary freeze-frame capture     |

pub mod camera;
pub mod driver;
pub mod heartbeat;
pub mod position;
pub mod trip;

use tracing::{debug, warn};

use crate::event::{EventData, TrackerEvent};
use crate::parser::{ParserState, RecordHeader, Verdict};
use crate::range;
use crate::registry::ParserConstructor;
use crate::sink::EventSink;

pub(crate) fn builtin() -> [(&'static str, ParserConstructor); 8] {
    [
        ("V100", position::V100::boxed),
        ("V101", position::V101::boxed),
        ("V109", driver::V109::boxed),
        ("V114", heartbeat::V114::boxed),
        ("V141", trip::V141::boxed),
        ("V201", heartbeat::V201::boxed),
        ("V204", camera::V204::boxed),
        ("V210", camera::V210::boxed),
    ]
}

/// Event with the header fields filled in.
fn base_event(state: &ParserState, header: &RecordHeader<'_>, tag: &'static str) -> TrackerEvent {
    if let Some(known) = state.tracker_id() {
        if known != header.tracker_id() {
            debug!(known, record = header.tracker_id(), tag, "record tracker differs from connection tracker");
        }
    }
    TrackerEvent::new(
        header.tracker_id(),
        tag,
        range::sequence(header.sequence),
        header.timestamp(),
    )
}

/// Creation code for variants that do not carry one: the tag number.
fn tag_code(tag: &str) -> Option<i16> {
    tag.get(1..).and_then(|n| n.parse().ok())
}

/// Write an event and its data rows. Data rows are dropped when the event
/// could not be stored.
fn store(sink: &dyn EventSink, event: &TrackerEvent, data: &[EventData]) -> Verdict {
    match sink.write_event(event) {
        Some(id) => {
            for row in data {
                sink.write_event_data(id, row);
            }
            Verdict::accepted()
        }
        None => {
            warn!(
                tracker = %event.tracker_id,
                tag = event.tag,
                sequence = event.sequence,
                "sink did not store event"
            );
            Verdict::rejected()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_code_is_numeric_part() {
        assert_eq!(tag_code("V114"), Some(114));
        assert_eq!(tag_code("V"), None);
        assert_eq!(tag_code("VXYZ"), None);
    }
}
