use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Service configuration.
///
/// Durations are written as integer milliseconds in configuration files
/// (`cleanup_interval_ms = 5000`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address every listener binds on. Default: `0.0.0.0`.
    pub bind_address: IpAddr,
    /// One listener per port. Port 0 binds an ephemeral port.
    pub ports: Vec<u16>,
    /// Pending-connection backlog per listener. Default: 128.
    pub backlog: u32,
    /// Bytes requested per receive. Default: 4096.
    pub receive_buffer_size: usize,
    /// Largest multi-chunk transfer accepted. Default: 1 MiB.
    pub max_assembly_size: usize,
    #[serde(rename = "cleanup_interval_ms", with = "duration_ms")]
    pub cleanup_interval: Duration,
    #[serde(rename = "parse_interval_ms", with = "duration_ms")]
    pub parse_interval: Duration,
    /// Idle time after which a classified connection is swept.
    #[serde(rename = "inactivity_timeout_ms", with = "duration_ms")]
    pub inactivity_timeout: Duration,
    /// Pause between stopping the listeners and draining workers.
    #[serde(rename = "shutdown_grace_ms", with = "duration_ms")]
    pub shutdown_grace: Duration,
    /// Workers idle longer than this are evicted during shutdown.
    #[serde(rename = "shutdown_max_worker_age_ms", with = "duration_ms")]
    pub shutdown_max_worker_age: Duration,
    /// Upper bound on the shutdown drain loop.
    #[serde(rename = "shutdown_drain_timeout_ms", with = "duration_ms")]
    pub shutdown_drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ports: vec![5000],
            backlog: 128,
            receive_buffer_size: 4096,
            max_assembly_size: 1024 * 1024,
            cleanup_interval: Duration::from_secs(5),
            parse_interval: Duration::from_secs(1),
            inactivity_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(5),
            shutdown_max_worker_age: Duration::from_secs(30),
            shutdown_drain_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(ServerError::InvalidConfig("no ports configured".into()));
        }
        if self.backlog == 0 {
            return Err(ServerError::InvalidConfig("backlog must be positive".into()));
        }
        if self.receive_buffer_size == 0 {
            return Err(ServerError::InvalidConfig(
                "receive_buffer_size must be positive".into(),
            ));
        }
        if self.max_assembly_size < self.receive_buffer_size {
            return Err(ServerError::InvalidConfig(format!(
                "max_assembly_size ({}) is smaller than receive_buffer_size ({})",
                self.max_assembly_size, self.receive_buffer_size
            )));
        }
        if self.cleanup_interval.is_zero() || self.parse_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "cleanup and parse intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    /// One socket address per configured port.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        self.ports
            .iter()
            .map(|&port| SocketAddr::new(self.bind_address, port))
            .collect()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
