use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use trackport_frame::{AssemblyProgress, ChunkAssembler, RawFrame};
use trackport_protocol::{ProtocolParser, Verdict};
use trackport_transport::is_teardown_error;

use crate::audit::{self, AuditStage};
use crate::context::ServiceContext;
use crate::registry::{ConnectionId, WorkerRegistry};

/// Shared view of one connection, held by the registry.
///
/// The socket itself is owned by the [`ConnectionWorker`] task; closing a
/// handle cancels that task, which then drops the socket.
#[derive(Debug)]
pub struct WorkerHandle {
    id: ConnectionId,
    peer: SocketAddr,
    last_activity: Mutex<Instant>,
    classified: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            last_activity: Mutex::new(Instant::now()),
            classified: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Record receive activity.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        let last = *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }

    /// A parser has been selected for this connection.
    pub fn mark_classified(&self) {
        self.classified.store(true, Ordering::Release);
    }

    pub fn is_classified(&self) -> bool {
        self.classified.load(Ordering::Acquire)
    }

    /// Classified and idle longer than `timeout`. Unclassified connections
    /// are never over age.
    pub fn is_over_age_at(&self, now: Instant, timeout: Duration) -> bool {
        self.is_classified() && self.idle_for(now) > timeout
    }

    pub fn is_over_age(&self, timeout: Duration) -> bool {
        self.is_over_age_at(Instant::now(), timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the connection and remove it from `registry`. Idempotent.
    pub fn close_and_destroy(&self, registry: &WorkerRegistry) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cancel.cancel();
        }
        registry.remove(self.id);
    }
}

enum WorkerState {
    AwaitingClassification,
    /// Every receive is one record; the connection stays open.
    Continuous(Box<dyn ProtocolParser>),
    /// A single-shot parser announced further lines.
    MoreLines(Box<dyn ProtocolParser>),
    Assembling {
        parser: Box<dyn ProtocolParser>,
        assembler: ChunkAssembler,
    },
    Done,
}

enum Step {
    Rearm,
    Close,
}

/// Receive loop for one accepted connection.
pub struct ConnectionWorker {
    handle: Arc<WorkerHandle>,
    stream: TcpStream,
    ctx: Arc<ServiceContext>,
    state: WorkerState,
}

impl ConnectionWorker {
    pub fn new(handle: Arc<WorkerHandle>, stream: TcpStream, ctx: Arc<ServiceContext>) -> Self {
        Self {
            handle,
            stream,
            ctx,
            state: WorkerState::AwaitingClassification,
        }
    }

    /// Run until the frame completes, the peer goes away, or the handle is
    /// closed. The socket is shut down and the worker deregistered on return.
    pub async fn run(mut self) {
        let conn_id = self.handle.id();
        let cancel = self.handle.cancel_token().clone();
        let mut buf = vec![0u8; self.ctx.config().receive_buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(conn_id, "connection closed by service");
                    break;
                }
                read = self.stream.read(&mut buf) => read,
            };

            let n = match read {
                Ok(n) => n,
                Err(err) if is_teardown_error(&err) => {
                    debug!(conn_id, error = %err, "connection torn down by peer");
                    break;
                }
                Err(err) => {
                    error!(conn_id, peer = %self.handle.peer(), error = %err, "receive failed");
                    break;
                }
            };

            self.handle.touch();
            match self.on_receive(&buf[..n]).await {
                Step::Rearm => continue,
                Step::Close => break,
            }
        }

        self.finish().await;
    }

    async fn on_receive(&mut self, chunk: &[u8]) -> Step {
        let conn_id = self.handle.id();
        match std::mem::replace(&mut self.state, WorkerState::Done) {
            WorkerState::Assembling {
                parser,
                mut assembler,
            } => match assembler.push(chunk) {
                Ok(AssemblyProgress::NeedMore) => {
                    self.state = WorkerState::Assembling { parser, assembler };
                    Step::Rearm
                }
                Ok(AssemblyProgress::Complete) => {
                    let transfer = assembler.finish();
                    debug!(conn_id, len = transfer.len(), "multi-chunk transfer complete");
                    self.complete_record(parser, transfer).await;
                    Step::Close
                }
                Err(err) => {
                    warn!(conn_id, tag = parser.tag(), error = %err, "dropping multi-chunk transfer");
                    Step::Close
                }
            },
            _ if chunk.is_empty() => {
                debug!(conn_id, "peer closed connection");
                Step::Close
            }
            WorkerState::AwaitingClassification => self.classify(chunk).await,
            WorkerState::Continuous(parser) => {
                audit::payload(AuditStage::Receive, Some(conn_id), parser.tracker_id(), chunk);
                self.continuous_record(parser, chunk).await
            }
            WorkerState::MoreLines(parser) => {
                audit::payload(AuditStage::Receive, Some(conn_id), parser.tracker_id(), chunk);
                self.single_record(parser, chunk).await
            }
            WorkerState::Done => Step::Close,
        }
    }

    async fn classify(&mut self, chunk: &[u8]) -> Step {
        let conn_id = self.handle.id();
        audit::payload(AuditStage::Receive, Some(conn_id), None, chunk);

        let Some(parser) = self.ctx.protocols().select(chunk) else {
            debug!(conn_id, peer = %self.handle.peer(), len = chunk.len(), "unclassified frame dropped");
            return Step::Close;
        };
        self.handle.mark_classified();
        debug!(conn_id, tag = parser.tag(), "connection classified");

        if parser.is_multi_chunk() {
            let mut assembler = ChunkAssembler::with_config(self.ctx.assembly_config());
            if let Err(err) = assembler.push(chunk) {
                warn!(conn_id, tag = parser.tag(), error = %err, "dropping multi-chunk transfer");
                return Step::Close;
            }
            self.state = WorkerState::Assembling { parser, assembler };
            return Step::Rearm;
        }

        if parser.is_continuous() {
            return self.continuous_record(parser, chunk).await;
        }
        self.single_record(parser, chunk).await
    }

    async fn continuous_record(&mut self, mut parser: Box<dyn ProtocolParser>, chunk: &[u8]) -> Step {
        if parser.validate(chunk).ok {
            self.enqueue(parser.as_mut(), Bytes::copy_from_slice(chunk));
        }
        let acked = self.send_ack(parser.tag(), parser.ack_or_nack()).await;
        self.state = WorkerState::Continuous(parser);
        if acked {
            Step::Rearm
        } else {
            Step::Close
        }
    }

    async fn single_record(&mut self, mut parser: Box<dyn ProtocolParser>, chunk: &[u8]) -> Step {
        let mut verdict = parser.validate(chunk);
        if verdict.ok && !self.enqueue(parser.as_mut(), Bytes::copy_from_slice(chunk)) {
            verdict = Verdict::rejected();
        }
        let acked = self.send_ack(parser.tag(), parser.ack_or_nack()).await;
        if acked && verdict.ok && verdict.more_data_expected {
            self.state = WorkerState::MoreLines(parser);
            return Step::Rearm;
        }
        Step::Close
    }

    async fn complete_record(&mut self, mut parser: Box<dyn ProtocolParser>, transfer: Bytes) {
        audit::payload(
            AuditStage::Receive,
            Some(self.handle.id()),
            parser.tracker_id(),
            &transfer,
        );
        let verdict = parser.validate(&transfer);
        if verdict.ok {
            self.enqueue(parser.as_mut(), transfer);
        } else {
            warn!(conn_id = self.handle.id(), tag = parser.tag(), "multi-chunk transfer failed validation");
        }
        self.send_ack(parser.tag(), parser.ack_or_nack()).await;
    }

    /// Queue a validated frame for the parse pass. A frame the buffer refuses
    /// is turned into a NACK so the device retransmits it.
    fn enqueue(&self, parser: &mut dyn ProtocolParser, frame: Bytes) -> bool {
        let tracker = parser.tracker_id().map(str::to_owned);
        if self.ctx.buffer().push(RawFrame::new(frame, tracker)) {
            return true;
        }
        debug!(conn_id = self.handle.id(), tag = parser.tag(), "buffer closed, frame refused");
        parser.state_mut().reject();
        false
    }

    /// Write an ACK/NACK. Returns whether the connection is still usable.
    async fn send_ack(&mut self, tag: &'static str, ack: Bytes) -> bool {
        if ack.is_empty() {
            return true;
        }
        match self.stream.write_all(&ack).await {
            Ok(()) => true,
            Err(err) if is_teardown_error(&err) => {
                debug!(conn_id = self.handle.id(), error = %err, "peer left before ack");
                false
            }
            Err(err) => {
                error!(conn_id = self.handle.id(), tag, error = %err, "ack write failed");
                false
            }
        }
    }

    async fn finish(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            if !is_teardown_error(&err) {
                debug!(conn_id = self.handle.id(), error = %err, "socket shutdown failed");
            }
        }
        self.handle.close_and_destroy(self.ctx.workers());
        debug!(conn_id = self.handle.id(), "connection worker finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> WorkerHandle {
        WorkerHandle::new(1, "127.0.0.1:40000".parse().expect("valid addr"))
    }

    #[test]
    fn unclassified_worker_is_never_over_age() {
        let worker = handle();
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(!worker.is_over_age_at(later, Duration::from_secs(1)));
    }

    #[test]
    fn classified_worker_ages_out() {
        let worker = handle();
        worker.mark_classified();
        let later = Instant::now() + Duration::from_secs(121);
        assert!(worker.is_over_age_at(later, Duration::from_secs(120)));
        assert!(!worker.is_over_age(Duration::from_secs(120)));
    }

    #[test]
    fn run_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let _spawnable = |worker: ConnectionWorker| assert_send(&worker.run());
    }

    #[test]
    fn touch_resets_idle_time() {
        let worker = handle();
        std::thread::sleep(Duration::from_millis(5));
        let before = worker.idle_for(Instant::now());
        worker.touch();
        assert!(worker.idle_for(Instant::now()) < before);
    }
}
