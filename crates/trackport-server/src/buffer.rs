use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use trackport_frame::RawFrame;
use trackport_protocol::{EventSink, ProtocolRegistry};

use crate::audit::{self, AuditStage};

/// Outcome of one parse pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PassReport {
    pub processed: usize,
    pub failed: usize,
    pub duration: Duration,
    pub avg_per_frame: Duration,
}

/// Point-in-time buffer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BufferStats {
    pub incoming: usize,
    pub in_flight: usize,
    pub last_pass: PassReport,
}

/// Double-buffered queue between connection workers and the parse pass.
///
/// Workers append to `incoming`. A parse cycle moves everything from
/// `incoming` to `in_flight` under both locks (always incoming first), then
/// takes `in_flight` and parses it with no lock held, so pushes never wait
/// on the sink. At most one cycle runs at a time.
#[derive(Debug, Default)]
pub struct RawBuffer {
    incoming: Mutex<Vec<RawFrame>>,
    in_flight: Mutex<Vec<RawFrame>>,
    parsing: AtomicBool,
    closed: AtomicBool,
    last_pass: Mutex<PassReport>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the `parsing` flag when a cycle ends, including on unwind.
struct ParsingGuard<'a>(&'a AtomicBool);

impl Drop for ParsingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the next parse pass. Returns `false` once closed.
    pub fn push(&self, frame: RawFrame) -> bool {
        if self.is_closed() {
            debug!(len = frame.len(), "buffer closed, frame discarded");
            return false;
        }
        lock(&self.incoming).push(frame);
        true
    }

    /// Move every incoming frame to in-flight. Returns the moved count.
    pub fn drain_to_in_flight(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let mut incoming = lock(&self.incoming);
        let mut in_flight = lock(&self.in_flight);
        let moved = incoming.len();
        in_flight.append(&mut incoming);
        moved
    }

    /// Parse every in-flight frame once, then discard them all.
    pub fn run_parse_pass(&self, protocols: &ProtocolRegistry, sink: &dyn EventSink) -> PassReport {
        if self.is_closed() {
            return PassReport::default();
        }
        let frames = std::mem::take(&mut *lock(&self.in_flight));
        if frames.is_empty() {
            let report = PassReport::default();
            *lock(&self.last_pass) = report;
            return report;
        }

        let started = Instant::now();
        let processed = frames.len();
        let mut failed = 0;
        for mut frame in frames {
            audit::payload(AuditStage::Parse, None, frame.tracker_id(), frame.payload());
            let ok = match protocols.select(frame.payload()) {
                Some(mut parser) => {
                    parser.set_tracker_id(frame.tracker_id().map(str::to_owned));
                    parser.parse(frame.payload(), sink).ok
                }
                None => false,
            };
            frame.record_parse(ok);
            if !frame.parsed_ok {
                failed += 1;
                warn!(
                    tracker = frame.tracker_id(),
                    len = frame.len(),
                    retries = frame.parse_retry_count,
                    "frame failed to parse, dropped"
                );
            }
        }

        let duration = started.elapsed();
        let report = PassReport {
            processed,
            failed,
            duration,
            avg_per_frame: duration / u32::try_from(processed).unwrap_or(u32::MAX),
        };
        *lock(&self.last_pass) = report;
        debug!(processed, failed, duration_ms = duration.as_millis() as u64, "parse pass finished");
        report
    }

    /// Drain and parse, unless a cycle is already running. A skipped cycle
    /// returns `None` and is not queued.
    pub fn try_parse_cycle(&self, protocols: &ProtocolRegistry, sink: &dyn EventSink) -> Option<PassReport> {
        if self
            .parsing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("parse pass already running, tick skipped");
            return None;
        }
        let _guard = ParsingGuard(&self.parsing);
        self.drain_to_in_flight();
        Some(self.run_parse_pass(protocols, sink))
    }

    pub fn is_parsing(&self) -> bool {
        self.parsing.load(Ordering::Acquire)
    }

    /// Stop accepting frames. Push, drain and pass become no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let dropped = lock(&self.incoming).len() + lock(&self.in_flight).len();
            if dropped > 0 {
                warn!(dropped, "raw buffer closed with unparsed frames");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            incoming: lock(&self.incoming).len(),
            in_flight: lock(&self.in_flight).len(),
            last_pass: *lock(&self.last_pass),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use trackport_protocol::{EventData, EventId, MemorySink, ParseLog, TrackerEvent};

    use super::*;

    const V100: &[u8] = b"TRK1,1,V100,02/01/2024 10:00:00,1.0,2.0,90,40,3,00";

    fn frame(record: &[u8]) -> RawFrame {
        RawFrame::new(record.to_vec(), Some("TRK1".to_string()))
    }

    /// Pushes a frame and attempts a nested cycle from inside the pass.
    struct ReentrantSink {
        buffer: Arc<RawBuffer>,
        protocols: ProtocolRegistry,
        inner: MemorySink,
        nested: Mutex<Vec<Option<PassReport>>>,
    }

    impl EventSink for ReentrantSink {
        fn write_event(&self, event: &TrackerEvent) -> Option<EventId> {
            self.buffer.push(frame(V100));
            let nested = self.buffer.try_parse_cycle(&self.protocols, &self.inner);
            lock(&self.nested).push(nested);
            self.inner.write_event(event)
        }

        fn write_event_data(&self, event_id: EventId, data: &EventData) {
            self.inner.write_event_data(event_id, data);
        }

        fn write_parse_log(&self, log: &ParseLog) {
            self.inner.write_parse_log(log);
        }
    }

    #[test]
    fn drain_moves_everything_in_order() {
        let buffer = RawBuffer::new();
        buffer.push(frame(b"first"));
        buffer.push(frame(b"second"));
        assert_eq!(buffer.drain_to_in_flight(), 2);

        let stats = buffer.stats();
        assert_eq!(stats.incoming, 0);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(lock(&buffer.in_flight)[0].payload(), b"first");
    }

    #[test]
    fn cycle_parses_each_frame_once() {
        let buffer = RawBuffer::new();
        let protocols = ProtocolRegistry::with_defaults();
        let sink = MemorySink::new();
        buffer.push(frame(V100));
        buffer.push(frame(b"garbage that matches nothing"));

        let report = buffer
            .try_parse_cycle(&protocols, &sink)
            .expect("idle buffer should run a cycle");
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.events().len(), 1);

        let again = buffer
            .try_parse_cycle(&protocols, &sink)
            .expect("idle buffer should run a cycle");
        assert_eq!(again.processed, 0);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(buffer.stats().in_flight, 0);
    }

    #[test]
    fn frames_pushed_during_a_pass_wait_for_the_next() {
        let buffer = Arc::new(RawBuffer::new());
        let sink = ReentrantSink {
            buffer: Arc::clone(&buffer),
            protocols: ProtocolRegistry::with_defaults(),
            inner: MemorySink::new(),
            nested: Mutex::new(Vec::new()),
        };
        buffer.push(frame(V100));

        let report = buffer
            .try_parse_cycle(&sink.protocols, &sink)
            .expect("first cycle should run");
        assert_eq!(report.processed, 1);
        assert_eq!(sink.inner.events().len(), 1);

        // The nested attempt was refused and the pushed frame is untouched.
        assert_eq!(*lock(&sink.nested), vec![None]);
        assert_eq!(buffer.stats().incoming, 1);
        assert!(!buffer.is_parsing());
    }

    #[test]
    fn closed_buffer_ignores_everything() {
        let buffer = RawBuffer::new();
        let protocols = ProtocolRegistry::with_defaults();
        let sink = MemorySink::new();
        buffer.push(frame(V100));
        buffer.close();

        assert!(!buffer.push(frame(V100)));
        assert_eq!(buffer.drain_to_in_flight(), 0);
        let report = buffer
            .try_parse_cycle(&protocols, &sink)
            .expect("closed buffer still takes the flag");
        assert_eq!(report.processed, 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn tracker_id_reaches_the_parser() {
        let buffer = RawBuffer::new();
        let protocols = ProtocolRegistry::with_defaults();
        let sink = MemorySink::new();
        buffer.push(frame(b"TRK1,5,V114,02/01/2024 10:00:00,1.0,2.0,30"));
        buffer.try_parse_cycle(&protocols, &sink);
        assert_eq!(sink.events()[0].tracker_id, "TRK1");
        assert_eq!(buffer.stats().last_pass.processed, 1);
    }
}
