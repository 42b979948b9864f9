//! Origin inventory subsystem.
//!
//! # Data Flow
//! ```text
//! config (initial set / reload) → OriginsInventory::add_origins / set_origins
//! health monitor signal          → HealthStatusListener → MonitoredOrigin::handle
//! admin command (OriginsBus)     → OriginsCommandListener → MonitoredOrigin::handle
//!     → state.rs transition table (per-origin lock)
//!     → publish: snapshot.rs builds OriginsSnapshot, diffs Changes
//!         → listeners.rs Announcer (only when Changes is non-empty)
//!         → bus.rs snapshot broadcast (every publish)
//!         → ArcSwap'd current snapshot read by the load balancer
//! ```
//!
//! # Design Decisions
//! - Events for one origin are serialized; different origins proceed independently
//! - Publication is serialized per inventory so listeners never see an older snapshot after a newer one
//! - Readers of the active set never take a lock

pub mod bus;
pub mod listeners;
pub mod origins;
pub mod snapshot;
pub mod state;

pub use bus::{OriginsBus, OriginsCommand, OriginsCommandListener};
pub use listeners::{Announcer, ListenerError, OriginsChangeListener};
pub use origins::{MonitoredOrigin, OriginsInventory, OriginsInventoryBuilder};
pub use snapshot::{Changes, OriginsSnapshot, SnapshotSummary};
pub use state::{transition, OriginEvent, OriginState};
