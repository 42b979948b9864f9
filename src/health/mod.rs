//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → Probe each monitored origin (check.rs)
//!     → Count consecutive successes/failures
//!     → Threshold reached → HealthStatusListener (the origins inventory)
//!     → Inventory drives the origin state machine
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - The inventory decides what a signal means; the monitor only counts
//! - Disabled origins are removed from monitoring, not just ignored

pub mod check;
pub mod monitor;

pub use check::{HealthCheck, HttpHealthCheck, OriginHealth};
pub use monitor::{HealthStatusListener, NoHealthMonitor, OriginHealthMonitor, ScheduledHealthMonitor};
