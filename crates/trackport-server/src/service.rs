use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use trackport_transport::{classify_accept_error, AcceptDisposition, TcpEndpoint, TransportError};

use crate::buffer::PassReport;
use crate::context::ServiceContext;
use crate::error::{Result, ServerError};
use crate::scheduler;
use crate::worker::{ConnectionWorker, WorkerHandle};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const EVICTION_PAUSE: Duration = Duration::from_millis(100);
const IDLE_DRAIN_PAUSE: Duration = Duration::from_secs(1);
const WORKER_EXIT_WAIT: Duration = Duration::from_secs(5);

/// What happened during shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShutdownReport {
    /// Workers evicted by the drain loop.
    pub evicted: usize,
    /// Workers still open when the drain budget ran out.
    pub forced: usize,
    /// The final drain-and-parse pass.
    pub final_pass: Option<PassReport>,
}

/// A running ingestion service: one accept loop per port plus the cleanup
/// and parse schedulers.
pub struct Service {
    ctx: Arc<ServiceContext>,
    local_addrs: Vec<SocketAddr>,
    stop: CancellationToken,
    connections: TaskTracker,
    accept_tasks: Vec<JoinHandle<TcpEndpoint>>,
    scheduler_tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Bind every configured port and start accepting.
    ///
    /// All ports are bound before any accept loop starts; a bind failure is
    /// returned and nothing is left running. Must be called from within a
    /// tokio runtime.
    pub fn start(ctx: Arc<ServiceContext>) -> Result<Self> {
        ctx.config().validate()?;

        let mut endpoints = Vec::with_capacity(ctx.config().ports.len());
        for addr in ctx.config().listen_addrs() {
            endpoints.push(TcpEndpoint::bind(addr, ctx.config().backlog)?);
        }
        let local_addrs: Vec<SocketAddr> = endpoints.iter().map(TcpEndpoint::local_addr).collect();

        let stop = CancellationToken::new();
        let connections = TaskTracker::new();
        let accept_tasks = endpoints
            .into_iter()
            .map(|endpoint| {
                tokio::spawn(accept_loop(
                    endpoint,
                    Arc::clone(&ctx),
                    stop.clone(),
                    connections.clone(),
                ))
            })
            .collect();
        let scheduler_tasks = vec![
            scheduler::spawn_cleanup(Arc::clone(&ctx), stop.clone()),
            scheduler::spawn_parse(Arc::clone(&ctx), stop.clone()),
        ];

        info!(addrs = ?local_addrs, "trackport service started");
        Ok(Self {
            ctx,
            local_addrs,
            stop,
            connections,
            accept_tasks,
            scheduler_tasks,
        })
    }

    /// Bound listener addresses, in configured port order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Stop accepting, drain connections, wait for their workers to exit,
    /// run a final parse pass and close the sink.
    pub async fn shutdown(self) -> Result<ShutdownReport> {
        info!("trackport service shutting down");
        self.stop.cancel();

        let mut listeners = Vec::with_capacity(self.accept_tasks.len());
        let mut task_error = None;
        for task in self.accept_tasks {
            match task.await {
                Ok(endpoint) => listeners.push(endpoint),
                Err(err) => task_error = Some(err.to_string()),
            }
        }
        for task in self.scheduler_tasks {
            if let Err(err) = task.await {
                task_error = Some(err.to_string());
            }
        }
        if let Some(err) = &task_error {
            error!(error = %err, "background task failed during shutdown");
        }

        let config = self.ctx.config();
        tokio::time::sleep(config.shutdown_grace).await;

        let evicted = drain_workers(
            &self.ctx,
            config.shutdown_max_worker_age,
            config.shutdown_drain_timeout,
        )
        .await;
        let forced = self.ctx.workers().close_all();
        if forced > 0 {
            warn!(forced, "drain budget exhausted, closing remaining connections");
        }

        self.connections.close();
        if tokio::time::timeout(WORKER_EXIT_WAIT, self.connections.wait())
            .await
            .is_err()
        {
            warn!(
                running = self.connections.len(),
                "connection workers still running after close"
            );
        }

        drop(listeners);
        debug!("listeners closed");

        let final_pass = scheduler::parse_tick(&self.ctx).await;
        self.ctx.buffer().close();
        self.ctx.sink().close();

        info!(evicted, forced, "trackport service stopped");
        match task_error {
            Some(err) => Err(ServerError::Task(err)),
            None => Ok(ShutdownReport {
                evicted,
                forced,
                final_pass,
            }),
        }
    }
}

async fn accept_loop(
    endpoint: TcpEndpoint,
    ctx: Arc<ServiceContext>,
    stop: CancellationToken,
    connections: TaskTracker,
) -> TcpEndpoint {
    let local = endpoint.local_addr();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            accepted = endpoint.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => spawn_worker(&ctx, &connections, stream, peer),
            Err(err) => {
                let disposition = match &err {
                    TransportError::Accept(source) | TransportError::Io(source) => {
                        classify_accept_error(source)
                    }
                    _ => AcceptDisposition::Fatal,
                };
                match disposition {
                    AcceptDisposition::Retry => {
                        debug!(listener = %local, error = %err, "accept failed, retrying");
                    }
                    AcceptDisposition::Backoff => {
                        warn!(listener = %local, error = %err, "accept failed, backing off");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    AcceptDisposition::Fatal => {
                        error!(listener = %local, error = %err, "listener cannot accept, stopping");
                        break;
                    }
                }
            }
        }
    }
    debug!(listener = %local, "accept loop stopped");
    endpoint
}

fn spawn_worker(
    ctx: &Arc<ServiceContext>,
    connections: &TaskTracker,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let handle = Arc::new(WorkerHandle::new(ctx.workers().next_id(), peer));
    debug!(conn_id = handle.id(), peer = %peer, "connection accepted");
    ctx.workers().insert(Arc::clone(&handle));
    connections.spawn(ConnectionWorker::new(handle, stream, Arc::clone(ctx)).run());
}

/// Evict workers idle longer than `max_age` until none remain or `budget`
/// runs out.
async fn drain_workers(ctx: &ServiceContext, max_age: Duration, budget: Duration) -> usize {
    let deadline = Instant::now() + budget;
    let mut evicted = 0;
    while !ctx.workers().is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let n = ctx.workers().evict_idle_longer_than(max_age);
        evicted += n;
        let pause = if n > 0 { EVICTION_PAUSE } else { IDLE_DRAIN_PAUSE };
        tokio::time::sleep(pause.min(remaining)).await;
    }
    evicted
}
