//! Retry policies.
//!
//! # Design Decisions
//! - Only failures another origin might not have are retried
//!   ([`DispatchError::is_retryable`])
//! - The suggested next origin is never one already tried

use std::fmt;

use http::{Method, Uri};

use crate::client::DispatchError;
use crate::load_balancer::{LoadBalancer, Preferences, RemoteHost};
use crate::origin::{AppId, OriginId};

/// The parts of the request a policy may look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub method: Method,
    pub uri: Uri,
}

/// Everything known about a dispatch after a failed attempt.
///
/// Built fresh for every evaluation.
#[derive(Clone, Copy)]
pub struct RetryContext<'a> {
    pub app_id: &'a AppId,
    /// Attempts made so far, including the one that just failed.
    pub retry_count: u32,
    pub last_error: Option<&'a DispatchError>,
    pub request: &'a RequestSummary,
    /// Origins tried so far, including the one that just failed.
    pub previous_origins: &'a [RemoteHost],
}

impl RetryContext<'_> {
    pub fn previous_ids(&self) -> Vec<OriginId> {
        self.previous_origins.iter().map(|h| h.id().clone()).collect()
    }
}

impl fmt::Debug for RetryContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<String> = self.previous_origins.iter().map(|h| h.origin().host_and_port()).collect();
        f.debug_struct("RetryContext")
            .field("app_id", &self.app_id)
            .field("retry_count", &self.retry_count)
            .field("last_error", &self.last_error.map(|e| e.to_string()))
            .field("request", &format_args!("{} {}", self.request.method, self.request.uri))
            .field("previous_origins", &hosts)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryOutcome {
    pub should_retry: bool,
    pub next_origin: Option<RemoteHost>,
}

pub trait RetryPolicy: Send + Sync {
    fn evaluate(
        &self,
        context: &RetryContext<'_>,
        load_balancer: &dyn LoadBalancer,
        preferences: &Preferences,
    ) -> RetryOutcome;
}

/// Retry retryable failures up to `max_retries` times after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryNTimes {
    max_retries: u32,
}

impl RetryNTimes {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryNTimes {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy for RetryNTimes {
    fn evaluate(
        &self,
        context: &RetryContext<'_>,
        load_balancer: &dyn LoadBalancer,
        preferences: &Preferences,
    ) -> RetryOutcome {
        let retryable = context.last_error.is_some_and(|e| e.is_retryable());
        let should_retry = retryable && context.retry_count <= self.max_retries;

        let next_origin = load_balancer
            .choose(preferences)
            .filter(|host| !context.previous_origins.iter().any(|p| p.id() == host.id()));

        RetryOutcome {
            should_retry,
            next_origin,
        }
    }
}
