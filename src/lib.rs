//! Backend dispatch core of an HTTP reverse proxy.
//!
//! Requests are routed to a backend application, which dispatches them to
//! one of its origins through per-origin connection pools, retrying failed
//! attempts on other origins.

// Value types and body plumbing
pub mod message;
pub mod origin;
pub mod stream;

// Outbound path
pub mod client;
pub mod load_balancer;
pub mod net;
pub mod pool;
pub mod resilience;

// Origin membership and health
pub mod health;
pub mod inventory;

// Front end and operations
pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use client::{BackendServiceClient, DispatchError};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use inventory::{OriginState, OriginsInventory};
pub use lifecycle::{Proxy, Shutdown};
pub use origin::{AppId, Origin, OriginId};
