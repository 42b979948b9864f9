//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! BackendServiceClient attempt fails (or no host was available):
//!     → RetryContext { attempt count, cause, request summary, tried origins }
//!     → retries.rs RetryPolicy::evaluate (with the load balancer and preferences)
//!     → RetryOutcome { should_retry, next_origin }
//!     → dispatcher retries against a fresh vote, or surfaces the failure
//! ```
//!
//! # Design Decisions
//! - The context is rebuilt for every evaluation, never mutated in place
//! - The dispatcher's own attempt cap applies regardless of the policy

pub mod retries;

pub use retries::{RequestSummary, RetryContext, RetryNTimes, RetryOutcome, RetryPolicy};
