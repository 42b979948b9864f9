//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request head (Host, path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (host AND path-prefix conditions)
//!     → AppId of the backend application, or no match (404)
//!
//! Route compilation (startup and reload):
//!     ApplicationConfig[] → sort by priority, prefix length → immutable Router
//! ```
//!
//! # Design Decisions
//! - Routers are rebuilt on reload and swapped atomically, never mutated
//! - Deterministic: same input always matches same application

pub mod matcher;
pub mod router;

pub use matcher::RequestHead;
pub use router::Router;
