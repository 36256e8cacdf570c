//! Centralized configuration for sensord.
//!
//! Compile-time tuning constants live in const-structs; per-server runtime
//! options (socket path, idle window) live in [`ServerConfig`].

use std::path::PathBuf;
use std::time::Duration;

/// IPC transport tuning.
pub struct IpcConfig;

impl IpcConfig {
    /// Maximum accepted frame payload size. Requests are short tokens and
    /// responses are small JSON documents; anything larger is a broken peer.
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

    /// Maximum concurrently serviced connections.
    pub const MAX_CONNECTIONS: usize = 32;

    /// Idle window before a session force-closes its connection.
    ///
    /// Clients polling every 10-50 seconds stay comfortably inside the
    /// window; a connection left alone past it is reclaimed.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(65);

    /// How long `stop()` waits for live sessions before aborting them.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

    /// Client-side connect timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Default socket file name under the system temp dir.
    pub const DEFAULT_SOCKET_NAME: &'static str = "sensord.sock";
}

/// Telemetry sampling tuning.
pub struct TelemetryConfig;

impl TelemetryConfig {
    /// How long sysinfo refreshes are reused before re-sampling.
    pub const REFRESH_TTL: Duration = Duration::from_secs(2);

    /// How long nvidia-smi results are cached.
    pub const GPU_CACHE_TTL: Duration = Duration::from_secs(2);
}

/// Runtime options for one [`TelemetryServer`](crate::TelemetryServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path of the Unix domain socket endpoint to bind.
    pub socket_path: PathBuf,
    /// Idle window before a session is closed.
    pub idle_timeout: Duration,
    /// Cap on concurrently serviced connections.
    pub max_connections: usize,
    /// Bounded wait for sessions to drain during `stop()`.
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Create a config binding the given socket path, with default tuning.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            idle_timeout: IpcConfig::IDLE_TIMEOUT,
            max_connections: IpcConfig::MAX_CONNECTIONS,
            shutdown_grace: IpcConfig::SHUTDOWN_GRACE,
        }
    }

    /// Override the idle window. Tests use short windows here.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Override the concurrent-connection cap.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Override the shutdown grace period.
    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(IpcConfig::DEFAULT_SOCKET_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_temp_socket() {
        let config = ServerConfig::default();
        assert!(config
            .socket_path
            .ends_with(IpcConfig::DEFAULT_SOCKET_NAME));
        assert_eq!(config.idle_timeout, IpcConfig::IDLE_TIMEOUT);
    }

    #[test]
    fn test_idle_window_matches_observed_behavior() {
        // Alive at 50s of inactivity, reclaimed by 70s.
        assert!(IpcConfig::IDLE_TIMEOUT > Duration::from_secs(50));
        assert!(IpcConfig::IDLE_TIMEOUT < Duration::from_secs(70));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::new("/tmp/test.sock")
            .with_idle_timeout(Duration::from_millis(200))
            .with_max_connections(4);
        assert_eq!(config.idle_timeout, Duration::from_millis(200));
        assert_eq!(config.max_connections, 4);
    }
}
