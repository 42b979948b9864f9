//! Outbound connection abstraction.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Define what the pool needs from a connection (write, close, liveness)
//! - Define how connections to an origin are created

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

use crate::message::{LiveRequest, LiveResponse};
use crate::net::transport::TransportError;
use crate::origin::Origin;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Settings a factory needs to open a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2000),
        }
    }
}

/// A live connection to one origin, carrying one request at a time.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn origin(&self) -> &Origin;

    /// False once the peer or the local side has closed the connection.
    fn is_connected(&self) -> bool;

    fn created_at(&self) -> Instant;

    /// Send a request and resolve once the response head has arrived.
    /// The response body streams afterwards.
    fn write(&self, request: LiveRequest) -> BoxFuture<'static, Result<LiveResponse, TransportError>>;

    /// Terminate the connection. Idempotent.
    fn close(&self);
}

pub trait ConnectionFactory: Send + Sync {
    fn create_connection(
        &self,
        origin: &Origin,
        settings: ConnectionSettings,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn connection_id_display() {
        let id = ConnectionId::new();
        assert_eq!(id.to_string(), format!("conn-{}", id.as_u64()));
    }
}
