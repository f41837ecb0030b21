mod alert;
mod cmd;
mod config;
mod exit;
mod logging;
mod output;
mod sink;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{LogFormat, LogLevel, LogOptions};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "trackport",
    version,
    about = "TCP ingestion server for vehicle and camera trackers"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log raw payloads as hex on receive and parse.
    #[arg(long, global = true)]
    audit: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let log = LogOptions {
        format: cli.log_format,
        level: cli.log_level,
        audit: cli.audit,
    };

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format, log);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
