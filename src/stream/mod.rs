//! Streaming message bodies.
//!
//! # Data Flow
//! ```text
//! origin socket / client socket
//!     → buffer.rs (owned chunk, released exactly once)
//!     → byte_stream.rs (lazy, consume-once chunk sequence)
//!         - map / discard / concat / replace_with
//!         - completion hooks (end, failure, cancel)
//!     → aggregator.rs (bounded collection into one buffer)
//!     → hyper body on the way out
//! ```
//!
//! # Design Decisions
//! - Chunks move between owners; there is no shared mutable body state
//! - Dropping a stream is cancellation
//! - Tracked buffers report release so leaks show up in tests

pub mod aggregator;
pub mod buffer;
pub mod byte_stream;

pub use aggregator::AggregateError;
pub use buffer::{Buffer, BufferTracker};
pub use byte_stream::{BodySender, BoxError, ByteStream, Completion, StreamError};
