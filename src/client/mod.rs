//! Backend service client subsystem.
//!
//! # Data Flow
//! ```text
//! http/server.rs hands over a LiveRequest + Transaction
//!     → backend_service.rs BackendServiceClient::send_request
//!         → rewrite.rs (first matching rule, applied once)
//!         → request body aggregated for replay (bounded)
//!         → LoadBalancer::choose (sticky / restriction cookies, avoid list)
//!         → host_client.rs HostHttpClient::send
//!             → ConnectionPool::borrow → Connection::write
//!             → body completion returns or closes the connection
//!         → failure → RetryPolicy::evaluate → next attempt or error.rs DispatchError
//!     → shaped LiveResponse (origin id header, sticky cookie, bodiless fixes)
//! ```
//!
//! # Design Decisions
//! - Attempts are strictly sequential and capped at three
//! - Cancellation wins every race with an in-flight attempt

pub mod backend_service;
pub mod error;
pub mod host_client;
pub mod rewrite;

pub use backend_service::{
    sticky_cookie_name, BackendServiceClient, BackendServiceClientBuilder, DEFAULT_ORIGIN_ID_HEADER,
    MAX_RETRY_ATTEMPTS,
};
pub use error::DispatchError;
pub use host_client::HostHttpClient;
pub use rewrite::{RegexRewrite, RewriteRule, RewriteRuleset};
