//! Outbound network layer.
//!
//! # Data Flow
//! ```text
//! Pool needs a connection
//!     → connection.rs (ConnectionFactory::create_connection)
//!     → transport.rs (TCP connect with timeout, HTTP/1.1 handshake)
//!     → Connection::write(request) → response head + streamed body
//!
//! Client disconnects
//!     → transaction.rs (cancel) → dispatcher closes the in-flight connection
//! ```
//!
//! # Design Decisions
//! - One request in flight per connection; the pool enforces exclusivity
//! - Each connection is driven by its own task, aborted on close
//! - TLS to origins is not handled by the plain factory

pub mod connection;
pub mod transaction;
pub mod transport;

pub use connection::{Connection, ConnectionFactory, ConnectionId, ConnectionSettings};
pub use transaction::{CancelOnDrop, Transaction};
pub use transport::{HttpConnection, HttpConnectionFactory, TransportError};
