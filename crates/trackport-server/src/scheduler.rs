//! Periodic cleanup sweep and parse pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use trackport_protocol::ParseLog;

use crate::buffer::PassReport;
use crate::context::ServiceContext;

/// Name used for the listener in parse logs.
pub fn listener_name(port: u16) -> String {
    format!("trackport:{port}")
}

/// Log buffer statistics, write a parse log, and close inactive workers.
/// Returns the number of workers closed.
pub fn cleanup_tick(ctx: &ServiceContext) -> usize {
    let stats = ctx.buffer().stats();
    let port = ctx.config().ports.first().copied().unwrap_or_default();
    let log = ParseLog {
        port,
        listener_name: listener_name(port),
        logged_at: Local::now().naive_local(),
        raw: stats.incoming,
        parsing: stats.in_flight,
        parse_index: stats.last_pass.processed,
        prev_duration_secs: stats.last_pass.duration.as_secs(),
        prev_avg_ms: stats.last_pass.avg_per_frame.as_secs_f64() * 1000.0,
    };
    info!(
        raw = log.raw,
        parsing = log.parsing,
        parse_index = log.parse_index,
        prev_duration_secs = log.prev_duration_secs,
        prev_avg_ms = log.prev_avg_ms,
        workers = ctx.workers().len(),
        "buffer statistics"
    );
    ctx.sink().write_parse_log(&log);

    let swept = ctx.workers().sweep_inactive(ctx.config().inactivity_timeout);
    if swept > 0 {
        debug!(swept, "inactive connections closed");
    }
    swept
}

/// Run one parse cycle on the blocking pool.
pub async fn parse_tick(ctx: &Arc<ServiceContext>) -> Option<PassReport> {
    let ctx = Arc::clone(ctx);
    match tokio::task::spawn_blocking(move || ctx.parse_cycle()).await {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "parse pass task failed");
            None
        }
    }
}

pub fn spawn_cleanup(ctx: Arc<ServiceContext>, stop: CancellationToken) -> JoinHandle<()> {
    let period = ctx.config().cleanup_interval;
    tokio::spawn(async move {
        run_periodic(period, &stop, || {
            let ctx = Arc::clone(&ctx);
            async move {
                cleanup_tick(&ctx);
            }
        })
        .await;
        debug!("cleanup scheduler stopped");
    })
}

/// Parse passes are awaited inside the loop, so ticks that fire while a pass
/// runs are skipped rather than stacked.
pub fn spawn_parse(ctx: Arc<ServiceContext>, stop: CancellationToken) -> JoinHandle<()> {
    let period = ctx.config().parse_interval;
    tokio::spawn(async move {
        run_periodic(period, &stop, || {
            let ctx = Arc::clone(&ctx);
            async move {
                parse_tick(&ctx).await;
            }
        })
        .await;
        debug!("parse scheduler stopped");
    })
}

async fn run_periodic<F, Fut>(period: Duration, stop: &CancellationToken, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tick().await;
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use trackport_frame::RawFrame;
    use trackport_protocol::{EventSink, MemorySink};

    use super::*;
    use crate::config::ServerConfig;
    use crate::worker::WorkerHandle;

    fn context(sink: &Arc<MemorySink>) -> Arc<ServiceContext> {
        let config = ServerConfig {
            ports: vec![5100],
            inactivity_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        let sink: Arc<dyn EventSink> = sink.clone();
        Arc::new(ServiceContext::new(config, sink))
    }

    #[test]
    fn cleanup_writes_parse_log_and_sweeps() {
        let sink = Arc::new(MemorySink::new());
        let ctx = context(&sink);
        let peer: SocketAddr = "127.0.0.1:40000".parse().expect("valid addr");
        let worker = Arc::new(WorkerHandle::new(ctx.workers().next_id(), peer));
        worker.mark_classified();
        ctx.workers().insert(Arc::clone(&worker));
        ctx.buffer().push(RawFrame::new(b"pending".to_vec(), None));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cleanup_tick(&ctx), 1);
        assert!(worker.is_closed());

        let logs = sink.parse_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].port, 5100);
        assert_eq!(logs[0].listener_name, "trackport:5100");
        assert_eq!(logs[0].raw, 1);
    }

    #[tokio::test]
    async fn parse_tick_runs_on_blocking_pool() {
        let sink = Arc::new(MemorySink::new());
        let ctx = context(&sink);
        ctx.buffer().push(RawFrame::new(
            b"TRK1,1,V100,02/01/2024 10:00:00,1.0,2.0,90,40,3,00".to_vec(),
            None,
        ));

        let report = parse_tick(&ctx).await.expect("idle buffer should parse");
        assert_eq!(report.processed, 1);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn schedulers_stop_on_cancel() {
        let sink = Arc::new(MemorySink::new());
        let ctx = context(&sink);
        let stop = CancellationToken::new();
        let cleanup = spawn_cleanup(Arc::clone(&ctx), stop.clone());
        let parse = spawn_parse(ctx, stop.clone());
        stop.cancel();
        cleanup.await.expect("cleanup task should stop");
        parse.await.expect("parse task should stop");
    }
}
