use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use trackport_server::audit::AUDIT_TARGET;

use crate::alert::AlertLayer;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct LogOptions {
    pub format: LogFormat,
    pub level: LogLevel,
    pub audit: bool,
}

/// Stderr filter: the chosen level everywhere, the audit target only on
/// request.
fn stderr_filter(level: LogLevel, audit: bool) -> Targets {
    let audit_level = if audit {
        LevelFilter::DEBUG
    } else {
        LevelFilter::OFF
    };
    Targets::new()
        .with_default(level.as_filter())
        .with_target(AUDIT_TARGET, audit_level)
}

pub fn init_logging(options: LogOptions, alerts: Option<AlertLayer>) {
    let filter = stderr_filter(options.level, options.audit);
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let fmt = match options.format {
        LogFormat::Text => fmt.boxed(),
        LogFormat::Json => fmt.json().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt.with_filter(filter))
        .with(alerts.map(|layer| layer.with_filter(LevelFilter::ERROR)))
        .try_init();
}
