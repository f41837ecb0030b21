use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::worker::WorkerHandle;

/// Identifier assigned to each accepted connection.
pub type ConnectionId = u64;

/// Live connection workers keyed by connection id.
///
/// Sweeps iterate over a snapshot, so a worker may remove itself while a
/// sweep is running.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<ConnectionId, Arc<WorkerHandle>>,
    next_id: AtomicU64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next connection id.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, handle: Arc<WorkerHandle>) {
        self.workers.insert(handle.id(), handle);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<WorkerHandle>> {
        self.workers.remove(&id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<WorkerHandle>> {
        self.workers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Handles present at the time of the call.
    pub fn snapshot(&self) -> Vec<Arc<WorkerHandle>> {
        self.workers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Close every classified worker idle longer than `timeout`.
    pub fn sweep_inactive(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let mut swept = 0;
        for handle in self.snapshot() {
            if handle.is_over_age_at(now, timeout) {
                debug!(conn_id = handle.id(), peer = %handle.peer(), "closing inactive connection");
                handle.close_and_destroy(self);
                swept += 1;
            }
        }
        swept
    }

    /// Close every worker idle longer than `age`, classified or not.
    pub fn evict_idle_longer_than(&self, age: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for handle in self.snapshot() {
            if handle.idle_for(now) > age {
                handle.close_and_destroy(self);
                evicted += 1;
            }
        }
        evicted
    }

    /// Close every worker.
    pub fn close_all(&self) -> usize {
        let handles = self.snapshot();
        for handle in &handles {
            handle.close_and_destroy(self);
        }
        handles.len()
    }
}
