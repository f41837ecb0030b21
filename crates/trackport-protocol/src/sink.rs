use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::event::{EventData, EventId, ParseLog, TrackerEvent};

/// The persistence collaborator decoded events are written to.
///
/// Calls are fire-and-forget from the parse pipeline's point of view:
/// implementations log their own failures and never panic back into a parse
/// pass. `write_event` returns `None` when the event could not be stored.
pub trait EventSink: Send + Sync {
    fn write_event(&self, event: &TrackerEvent) -> Option<EventId>;

    fn write_event_data(&self, event_id: EventId, data: &EventData);

    fn write_parse_log(&self, log: &ParseLog);

    /// Release resources. Called once during shutdown.
    fn close(&self) {}
}

#[derive(Debug, Default)]
struct Records {
    events: Vec<(EventId, TrackerEvent)>,
    data: Vec<(EventId, EventData)>,
    parse_logs: Vec<ParseLog>,
}

/// In-memory sink that keeps everything it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Records>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events written so far, in write order.
    pub fn events(&self) -> Vec<TrackerEvent> {
        self.lock().events.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Event data rows with the id of the event they belong to.
    pub fn event_data(&self) -> Vec<(EventId, EventData)> {
        self.lock().data.clone()
    }

    pub fn parse_logs(&self) -> Vec<ParseLog> {
        self.lock().parse_logs.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for MemorySink {
    fn write_event(&self, event: &TrackerEvent) -> Option<EventId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().events.push((id, event.clone()));
        Some(id)
    }

    fn write_event_data(&self, event_id: EventId, data: &EventData) {
        self.lock().data.push((event_id, data.clone()));
    }

    fn write_parse_log(&self, log: &ParseLog) {
        self.lock().parse_logs.push(log.clone());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
