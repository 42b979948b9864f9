//! Per-origin connection pooling.
//!
//! # Data Flow
//! ```text
//! Dispatcher / health probe
//!     → ConnectionPool::borrow()
//!         - idle connection available → lend it
//!         - below max_connections_per_host → open a new one
//!         - otherwise → queue (bounded, timed) until a connection or slot frees up
//!     → BorrowedConnection (exclusive use)
//!     → release() → back to idle, or straight to the oldest waiter
//!       close()   → terminated, its slot handed to a waiter
//! ```
//!
//! # Design Decisions
//! - A borrow ends exactly once: `release` and `close` consume the guard
//! - Dropping an unfinished guard closes the connection
//! - Pool state sits behind one short-lived lock, never held across I/O

pub mod settings;
pub mod simple;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::net::{Connection, ConnectionId, TransportError};
use crate::origin::Origin;

pub use settings::ConnectionPoolSettings;
pub use simple::{SimpleConnectionPool, SimpleConnectionPoolFactory};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("connection pool for {origin} is closed")]
    Closed { origin: String },

    #[error("too many borrowers waiting for {origin}: {pending} pending, limit {max}")]
    MaxPendingExceeded {
        origin: String,
        pending: usize,
        max: usize,
    },

    #[error("timed out after {timeout_ms}ms waiting for a connection to {origin}")]
    PendingTimeout { origin: String, timeout_ms: u64 },

    #[error(transparent)]
    Connect(#[from] TransportError),
}

impl PoolError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::Closed { .. }
            | PoolError::MaxPendingExceeded { .. }
            | PoolError::PendingTimeout { .. } => true,
            PoolError::Connect(e) => e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub busy: usize,
    pub available: usize,
    pub pending: usize,
    pub connection_attempts: u64,
    pub connection_failures: u64,
    pub closed_connections: u64,
    pub terminated_connections: u64,
}

/// Where a borrowed connection goes back to.
pub trait ConnectionLender: Send + Sync {
    fn return_connection(&self, connection: Arc<dyn Connection>);

    fn close_connection(&self, connection: Arc<dyn Connection>);
}

pub trait ConnectionPool: ConnectionLender {
    fn origin(&self) -> &Origin;

    fn borrow(&self) -> BoxFuture<'static, Result<BorrowedConnection, PoolError>>;

    /// True when no further borrower can be queued.
    fn is_exhausted(&self) -> bool;

    fn stats(&self) -> PoolStats;

    /// Close every connection and fail queued borrowers. Idempotent.
    fn close(&self);
}

pub trait ConnectionPoolFactory: Send + Sync {
    fn create_pool(&self, origin: &Origin) -> Arc<dyn ConnectionPool>;
}

/// Exclusive use of a pooled connection.
///
/// Ends with [`release`](Self::release) or [`close`](Self::close). A guard
/// dropped without either closes the connection.
pub struct BorrowedConnection {
    connection: Option<Arc<dyn Connection>>,
    lender: Arc<dyn ConnectionLender>,
}

impl BorrowedConnection {
    pub fn new(connection: Arc<dyn Connection>, lender: Arc<dyn ConnectionLender>) -> Self {
        Self {
            connection: Some(connection),
            lender,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        // Only `release`/`close`/`drop` take the connection, and they consume the guard.
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection taken from a live guard"))
    }

    pub fn id(&self) -> ConnectionId {
        self.connection().id()
    }

    /// Hand the connection back for reuse.
    pub fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            self.lender.return_connection(connection);
        }
    }

    /// Terminate the connection and free its slot.
    pub fn close(mut self) {
        if let Some(connection) = self.connection.take() {
            self.lender.close_connection(connection);
        }
    }
}

impl std::fmt::Debug for BorrowedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.connection.as_ref().map(|c| c.id());
        f.debug_struct("BorrowedConnection").field("connection", &id).finish()
    }
}

impl Drop for BorrowedConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(connection_id = %connection.id(), "Borrowed connection dropped unfinished, closing");
            self.lender.close_connection(connection);
        }
    }
}
