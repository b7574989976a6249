//! Server Configuration
//!
//! All tunables for a running server. `main.rs` fills this from the
//! command line; tests build it directly with struct update syntax.

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;
use crate::storage::DEFAULT_SWEEP_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default snapshot file, relative to the working directory.
pub const DEFAULT_SNAPSHOT_PATH: &str = "data.json";

/// Runtime settings for [`Server`](crate::server::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where snapshots are loaded from and saved to; `None` disables persistence
    pub snapshot_path: Option<PathBuf>,
    /// Interval between active expiry sweeps
    pub sweep_interval: Duration,
    /// A connection with no reads or writes for this long is closed
    pub idle_timeout: Duration,
    /// Upper bound for writing one reply
    pub write_timeout: Duration,
    /// How long shutdown waits for connection handlers to exit
    pub shutdown_timeout: Duration,
    /// Longest accepted command line, in bytes
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            idle_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.snapshot_path, Some(PathBuf::from("data.json")));
    }
}
