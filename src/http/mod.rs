//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request id, trace, timeout)
//!     → routing (host / path prefix → application)
//!     → request.rs (axum request → LiveRequest)
//!     → BackendServiceClient::send_request
//!     → response.rs (LiveResponse → axum response, or error → status)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{into_live_request, request_id, X_REQUEST_ID};
pub use response::{error_response, into_axum_response, status_for};
pub use server::{AppState, HttpServer};
