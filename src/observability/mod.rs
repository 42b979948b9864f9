//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! inventory / pool / client / http produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms through the `metrics` facade)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or observability.log_level)
//!     → Prometheus scrape endpoint (observability.metrics_address)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the tower-http request-id layers into every log line
//! - Metric updates are fire-and-forget; without an installed recorder they are no-ops

pub mod logging;
pub mod metrics;
