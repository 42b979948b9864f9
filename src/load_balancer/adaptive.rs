//! Adaptive load balancing strategy.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::inventory::listeners::{ListenerError, OriginsChangeListener};
use crate::inventory::snapshot::{Changes, OriginsSnapshot};
use crate::load_balancer::{eligible, ActiveOrigins, LeastBusy, LoadBalancer, Preferences, RemoteHost, RoundRobin};

pub const DEFAULT_REQUEST_COUNT: usize = 100;

/// Round-robin until every origin has seen `request_count` votes on
/// average, then least-busy. Any inventory change starts over with
/// round-robin so new and recovered origins warm up first.
pub struct Adaptive {
    origins: Arc<dyn ActiveOrigins>,
    round_robin: RoundRobin,
    least_busy: LeastBusy,
    request_count: usize,
    warmup: Arc<Warmup>,
}

/// Warm-up progress, shared with the inventory as a change listener.
#[derive(Debug, Default)]
pub struct Warmup {
    votes: AtomicUsize,
    done: AtomicBool,
}

impl Warmup {
    fn reset(&self) {
        self.done.store(false, Ordering::Release);
        self.votes.store(0, Ordering::Release);
    }
}

impl OriginsChangeListener for Warmup {
    fn origins_changed(&self, _snapshot: &OriginsSnapshot, _changes: &Changes) -> Result<(), ListenerError> {
        self.reset();
        Ok(())
    }
}

impl Adaptive {
    /// `request_count` is clamped to at least one.
    pub fn new(origins: Arc<dyn ActiveOrigins>, request_count: usize) -> Self {
        Self {
            round_robin: RoundRobin::new(Arc::clone(&origins)),
            least_busy: LeastBusy::new(Arc::clone(&origins)),
            origins,
            request_count: request_count.max(1),
            warmup: Arc::new(Warmup::default()),
        }
    }

    /// Register this with the inventory to restart warm-up on every change.
    pub fn change_listener(&self) -> Arc<dyn OriginsChangeListener> {
        self.warmup.clone()
    }

    pub fn is_warming_up(&self) -> bool {
        !self.warmup.done.load(Ordering::Acquire)
    }
}

impl LoadBalancer for Adaptive {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let active = self.origins.snapshot().len();
        if active < 2 {
            return eligible(self.origins.as_ref(), preferences);
        }

        if self.is_warming_up() {
            let votes = self.warmup.votes.fetch_add(1, Ordering::AcqRel);
            if votes >= self.request_count.saturating_mul(active) {
                tracing::debug!(votes, "Warm-up complete, switching to least-busy");
                self.warmup.done.store(true, Ordering::Release);
            }
        }

        if self.is_warming_up() {
            self.round_robin.vote(preferences)
        } else {
            self.least_busy.vote(preferences)
        }
    }
}
