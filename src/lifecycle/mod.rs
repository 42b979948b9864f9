//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → per application: inventory + LB chain + dispatcher
//!     → health monitor, admin API, reload task → HTTP listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain (bounded) → Close inventories
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload config file
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, DRAIN_DEADLINE};
pub use signals::spawn_signal_handler;
pub use startup::{Application, Proxy, StartupError};
