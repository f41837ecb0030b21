use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::LogOptions;
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the ingestion service.
    Serve(ServeArgs),
    /// Send one frame to a running service and print the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, log: LogOptions) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format, log),
        Command::Send(args) => {
            crate::logging::init_logging(log, None);
            send::run(args, format)
        }
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c', env = "TRACKPORT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Listening ports (repeatable or comma-separated). Replaces the configured list.
    #[arg(long, short = 'p', value_delimiter = ',', env = "TRACKPORT_PORTS")]
    pub port: Vec<u16>,
    /// Address every listener binds on.
    #[arg(long, env = "TRACKPORT_BIND")]
    pub bind: Option<IpAddr>,
    /// Pending-connection backlog per listener.
    #[arg(long)]
    pub backlog: Option<u32>,
    /// Interval between parse passes (e.g. 1s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub parse_interval: Option<String>,
    /// Interval between inactivity sweeps.
    #[arg(long, value_name = "DURATION")]
    pub cleanup_interval: Option<String>,
    /// Idle time after which a classified connection is closed.
    #[arg(long, value_name = "DURATION")]
    pub inactivity_timeout: Option<String>,
    /// Append decoded events as JSON lines to FILE instead of stdout.
    #[arg(long, env = "TRACKPORT_EVENTS", value_name = "FILE")]
    pub events: Option<PathBuf>,
    /// Append error alerts as JSON lines to FILE.
    #[arg(long, env = "TRACKPORT_ALERTS", value_name = "FILE")]
    pub alerts: Option<PathBuf>,
    /// Shut down after this long instead of waiting for a signal.
    #[arg(long, value_name = "DURATION")]
    pub run_for: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Service address (host:port).
    pub addr: SocketAddr,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["file", "hex"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Hex-encoded payload, for binary frames.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Append a NUL terminator to the payload.
    #[arg(long)]
    pub nul: bool,
    /// Shut down the write half after sending, as multi-chunk senders do.
    #[arg(long)]
    pub half_close: bool,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
