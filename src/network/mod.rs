//! Network module - Handles datagram exchange with the bank server
//!
//! Provides:
//! - A transport abstraction with a UDP implementation
//! - The request engine (retrying request/reply and the monitor window)

mod client;
mod transport;

pub use client::*;
pub use transport::*;

use std::net::SocketAddr;
use std::time::Duration;

/// Upper bound on a single receive while listening for callbacks
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Per-attempt reply timeout in milliseconds
    pub timeout_ms: u64,
    /// Total send attempts before giving up
    pub max_attempts: u32,
    /// Largest datagram that may be transmitted
    pub max_datagram_size: usize,
    /// Discard replies whose echoed id does not match the outstanding request
    pub verify_reply_id: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::protocol::DEFAULT_PORT,
            timeout_ms: 5000,
            max_attempts: 5,
            max_datagram_size: crate::protocol::MAX_DATAGRAM_SIZE,
            verify_reply_id: false,
        }
    }
}

impl NetworkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_reply_id_check(mut self, enabled: bool) -> Self {
        self.verify_reply_id = enabled;
        self
    }

    /// Per-attempt reply timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Attempt budget, never below one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.attempts(), 5);
        assert!(!config.verify_reply_id);
    }

    #[test]
    fn test_attempts_never_zero() {
        let config = NetworkConfig::new("localhost", 1).with_max_attempts(0);
        assert_eq!(config.attempts(), 1);
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let addr = resolve_host("127.0.0.1", 8080).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());
    }
}
