//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, all errors reported)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates the new config
//!     → mpsc channel → lifecycle reload task
//!     → OriginsInventory::set_origins per known application
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - An invalid reload never replaces a running config
//! - Reload changes origin membership; applications themselves are fixed at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{ApplicationConfig, ListenerConfig, ProxyConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
