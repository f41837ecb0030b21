use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use trackport_protocol::EventSink;
use trackport_server::{ServerConfig, Service, ServiceContext};

use crate::alert::{AlertLayer, FileNotifier};
use crate::cmd::{parse_duration, ServeArgs};
use crate::config::TrackportConfig;
use crate::exit::{io_error, server_error, CliError, CliResult, SUCCESS};
use crate::logging::{init_logging, LogOptions};
use crate::output::{print_listening, print_stopped, OutputFormat};
use crate::sink::JsonLinesSink;

pub fn run(args: ServeArgs, format: OutputFormat, log: LogOptions) -> CliResult<i32> {
    let mut config = match &args.config {
        Some(path) => TrackportConfig::load(path)?,
        None => TrackportConfig::default(),
    };
    apply_overrides(&mut config, &args)?;
    let run_for = args.run_for.as_deref().map(parse_duration).transpose()?;

    let alerts = match &config.alerts.file {
        Some(path) => {
            let notifier = FileNotifier::open(path).map_err(|err| {
                io_error(&format!("failed opening alert file {}", path.display()), err)
            })?;
            Some(AlertLayer::new(
                Arc::new(notifier),
                config.alerts.channels.clone(),
            ))
        }
        None => None,
    };
    init_logging(log, alerts);

    let sink: Arc<dyn EventSink> = match &config.sink.events {
        Some(path) => Arc::new(JsonLinesSink::create(path).map_err(|err| {
            io_error(&format!("failed opening event file {}", path.display()), err)
        })?),
        None => Arc::new(JsonLinesSink::stdout()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    runtime.block_on(async move {
        let ctx = Arc::new(ServiceContext::new(config.server, sink));
        let service =
            Service::start(ctx).map_err(|err| server_error("failed to start service", err))?;
        print_listening(service.local_addrs(), format);

        wait_for_stop(run_for).await;

        let report = service
            .shutdown()
            .await
            .map_err(|err| server_error("shutdown failed", err))?;
        print_stopped(&report, format);
        Ok::<i32, CliError>(SUCCESS)
    })
}

fn apply_overrides(config: &mut TrackportConfig, args: &ServeArgs) -> CliResult<()> {
    let server: &mut ServerConfig = &mut config.server;
    if !args.port.is_empty() {
        server.ports = args.port.clone();
    }
    if let Some(bind) = args.bind {
        server.bind_address = bind;
    }
    if let Some(backlog) = args.backlog {
        server.backlog = backlog;
    }
    if let Some(value) = &args.parse_interval {
        server.parse_interval = parse_duration(value)?;
    }
    if let Some(value) = &args.cleanup_interval {
        server.cleanup_interval = parse_duration(value)?;
    }
    if let Some(value) = &args.inactivity_timeout {
        server.inactivity_timeout = parse_duration(value)?;
    }
    if args.run_for.is_some() {
        // Bounded runs stop without the grace period.
        server.shutdown_grace = Duration::ZERO;
        server.shutdown_max_worker_age = Duration::ZERO;
    }
    if let Some(path) = &args.events {
        config.sink.events = Some(path.clone());
    }
    if let Some(path) = &args.alerts {
        config.alerts.file = Some(path.clone());
    }
    Ok(())
}

async fn wait_for_stop(run_for: Option<Duration>) {
    let deadline = async {
        match run_for {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = deadline => info!("run time elapsed, stopping"),
        _ = ctrl_c() => info!("interrupt received, stopping"),
        _ = terminate() => info!("terminate received, stopping"),
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args() -> ServeArgs {
        ServeArgs {
            config: None,
            port: Vec::new(),
            bind: None,
            backlog: None,
            parse_interval: None,
            cleanup_interval: None,
            inactivity_timeout: None,
            events: None,
            alerts: None,
            run_for: None,
        }
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = TrackportConfig::parse("[server]\nports = [6000]\nbacklog = 16\n")
            .expect("config should parse");
        let args = ServeArgs {
            port: vec![7000, 7001],
            parse_interval: Some("250ms".to_string()),
            events: Some(PathBuf::from("events.jsonl")),
            ..args()
        };
        apply_overrides(&mut config, &args).expect("overrides should apply");

        assert_eq!(config.server.ports, vec![7000, 7001]);
        assert_eq!(config.server.backlog, 16);
        assert_eq!(config.server.parse_interval, Duration::from_millis(250));
        assert_eq!(config.sink.events, Some(PathBuf::from("events.jsonl")));
    }

    #[test]
    fn bounded_runs_skip_the_shutdown_grace() {
        let mut config = TrackportConfig::default();
        let args = ServeArgs {
            run_for: Some("1s".to_string()),
            ..args()
        };
        apply_overrides(&mut config, &args).expect("overrides should apply");
        assert_eq!(config.server.shutdown_grace, Duration::ZERO);
    }

    #[test]
    fn bad_duration_is_a_usage_error() {
        let mut config = TrackportConfig::default();
        let args = ServeArgs {
            cleanup_interval: Some("soon".to_string()),
            ..args()
        };
        let err = apply_overrides(&mut config, &args).expect_err("bad duration should fail");
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
