use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::error;
use trackport_protocol::{EventData, EventId, EventSink, ParseLog, TrackerEvent};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Event {
        id: EventId,
        #[serde(flatten)]
        event: &'a TrackerEvent,
    },
    EventData {
        event_id: EventId,
        #[serde(flatten)]
        data: &'a EventData,
    },
    ParseLog {
        #[serde(flatten)]
        log: &'a ParseLog,
    },
}

/// Writes every record as one JSON object per line.
///
/// Event ids are generated locally, starting at 1.
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
    next_id: AtomicU64,
}

impl JsonLinesSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicU64::new(0),
        }
    }

    /// Append to `path`, creating it if needed.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn write_record(&self, record: &Record<'_>) -> bool {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "failed to encode sink record");
                return false;
            }
        };
        line.push(b'\n');
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        match out.write_all(&line) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to write sink record");
                false
            }
        }
    }
}

impl EventSink for JsonLinesSink {
    fn write_event(&self, event: &TrackerEvent) -> Option<EventId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.write_record(&Record::Event { id, event }).then_some(id)
    }

    fn write_event_data(&self, event_id: EventId, data: &EventData) {
        self.write_record(&Record::EventData { event_id, data });
    }

    fn write_parse_log(&self, log: &ParseLog) {
        if self.write_record(&Record::ParseLog { log }) {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = out.flush() {
                error!(error = %err, "failed to flush sink");
            }
        }
    }

    fn close(&self) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = out.flush() {
            error!(error = %err, "failed to flush sink on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;

    /// Shared in-memory writer so the test can read back what was written.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn event() -> TrackerEvent {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(10, 11, 12))
            .expect("valid timestamp");
        TrackerEvent::new("TRK7".to_string(), "V100", 15, ts)
    }

    fn lines(buf: &SharedBuf) -> Vec<serde_json::Value> {
        let bytes = buf.0.lock().expect("lock should not be poisoned").clone();
        String::from_utf8(bytes)
            .expect("sink output should be UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
            .collect()
    }

    #[test]
    fn records_are_tagged_by_kind() {
        let buf = SharedBuf::default();
        let sink = JsonLinesSink::new(Box::new(buf.clone()));
        let event = event();

        let id = sink.write_event(&event).expect("event should be written");
        sink.write_event_data(id, &EventData::for_event(&event, "Channel").with_int(2));
        sink.close();

        let lines = lines(&buf);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "event");
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["tracker_id"], "TRK7");
        assert_eq!(lines[1]["kind"], "event_data");
        assert_eq!(lines[1]["event_id"], 1);
        assert_eq!(lines[1]["int_value"], 2);
    }

    #[test]
    fn ids_increase_per_event() {
        let sink = JsonLinesSink::new(Box::new(SharedBuf::default()));
        let event = event();
        assert_eq!(sink.write_event(&event), Some(1));
        assert_eq!(sink.write_event(&event), Some(2));
    }

    #[test]
    fn write_failure_yields_no_id() {
        let sink = JsonLinesSink::new(Box::new(BrokenWriter));
        assert_eq!(sink.write_event(&event()), None);
    }
}
