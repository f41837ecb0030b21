use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use trackport_server::ServerConfig;

use crate::alert::NotificationChannel;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID};

/// Contents of a `trackport.toml` file.
///
/// ```toml
/// [server]
/// ports = [5000, 5001]
/// parse_interval_ms = 1000
///
/// [alerts]
/// file = "/var/log/trackport/alerts.jsonl"
/// channels = ["email", "telegram"]
///
/// [sink]
/// events = "/var/lib/trackport/events.jsonl"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackportConfig {
    pub server: ServerConfig,
    pub alerts: AlertConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    /// Append error alerts here. Alerting is off when unset.
    pub file: Option<PathBuf>,
    pub channels: Vec<NotificationChannel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkConfig {
    /// JSON-lines event file. Events go to stdout when unset.
    pub events: Option<PathBuf>,
}

impl TrackportConfig {
    pub fn parse(text: &str) -> CliResult<Self> {
        toml::from_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid configuration: {err}")))
    }

    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        Self::parse(&text).map_err(|err| {
            CliError::new(err.code, format!("{}: {}", path.display(), err.message))
        })
    }
}
