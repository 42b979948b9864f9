//! Connection pool limits and timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::ConnectionSettings;

/// Per-origin pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolSettings {
    /// Connections that may be lent out (or being opened) at once.
    pub max_connections_per_host: usize,
    /// Borrowers allowed to queue once every connection is busy.
    pub max_pending_connections_per_host: usize,
    pub connect_timeout_ms: u64,
    /// How long a queued borrower waits before giving up.
    pub pending_connection_timeout_ms: u64,
    /// Idle connections older than this are closed instead of reused.
    pub connection_expiration_secs: Option<u64>,
}

impl Default for ConnectionPoolSettings {
    fn default() -> Self {
        Self {
            max_connections_per_host: 50,
            max_pending_connections_per_host: 25,
            connect_timeout_ms: 2000,
            pending_connection_timeout_ms: 2000,
            connection_expiration_secs: None,
        }
    }
}

impl ConnectionPoolSettings {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn pending_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_connection_timeout_ms)
    }

    pub fn connection_expiration(&self) -> Option<Duration> {
        self.connection_expiration_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = ConnectionPoolSettings::default();
        assert_eq!(settings.max_connections_per_host, 50);
        assert_eq!(settings.max_pending_connections_per_host, 25);
        assert_eq!(settings.connection_settings().connect_timeout, Duration::from_secs(2));
        assert_eq!(settings.pending_connection_timeout(), Duration::from_secs(2));
        assert!(settings.connection_expiration().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings: ConnectionPoolSettings = toml::from_str("max_connections_per_host = 4").unwrap();
        assert_eq!(settings.max_connections_per_host, 4);
        assert_eq!(settings.max_pending_connections_per_host, 25);
    }
}
