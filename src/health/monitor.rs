//! Scheduled health monitoring with thresholds.
//!
//! # Responsibilities
//! - Probe every monitored origin on a fixed interval
//! - Count consecutive successes/failures per origin
//! - Signal listeners once a threshold is reached
//!
//! # Design Decisions
//! - Signals repeat on every probe past the threshold; listeners treat
//!   repeated signals as no-ops
//! - Counters reset when monitoring of an origin stops

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::health::check::{HealthCheck, OriginHealth};
use crate::origin::Origin;

/// Receives health signals for monitored origins.
pub trait HealthStatusListener: Send + Sync {
    fn origin_healthy(&self, origin: &Origin);

    fn origin_unhealthy(&self, origin: &Origin);
}

pub trait OriginHealthMonitor: Send + Sync {
    fn monitor(&self, origins: &[Origin]);

    fn stop_monitoring(&self, origins: &[Origin]);

    fn add_listener(&self, listener: Weak<dyn HealthStatusListener>);

    /// False for monitors that never probe.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// A monitor that never probes. Origins stay in whatever state commands put them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHealthMonitor;

impl OriginHealthMonitor for NoHealthMonitor {
    fn monitor(&self, _origins: &[Origin]) {}

    fn stop_monitoring(&self, _origins: &[Origin]) {}

    fn add_listener(&self, _listener: Weak<dyn HealthStatusListener>) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_successes: AtomicUsize,
    consecutive_failures: AtomicUsize,
}

impl Counters {
    /// Returns true once the success streak reaches `threshold`.
    fn mark_success(&self, threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1 >= threshold
    }

    /// Returns true once the failure streak reaches `threshold`.
    fn mark_failure(&self, threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1 >= threshold
    }
}

pub struct ScheduledHealthMonitor {
    check: Arc<dyn HealthCheck>,
    interval: Duration,
    healthy_threshold: usize,
    unhealthy_threshold: usize,
    origins: DashMap<Origin, Arc<Counters>>,
    listeners: Mutex<Vec<Weak<dyn HealthStatusListener>>>,
}

impl ScheduledHealthMonitor {
    pub fn new(
        check: Arc<dyn HealthCheck>,
        interval: Duration,
        healthy_threshold: u32,
        unhealthy_threshold: u32,
    ) -> Self {
        Self {
            check,
            interval,
            healthy_threshold: healthy_threshold.max(1) as usize,
            unhealthy_threshold: unhealthy_threshold.max(1) as usize,
            origins: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(check: Arc<dyn HealthCheck>, config: &HealthCheckConfig) -> Self {
        Self::new(
            check,
            Duration::from_secs(config.interval_secs.max(1)),
            config.healthy_threshold,
            config.unhealthy_threshold,
        )
    }

    pub fn monitored_count(&self) -> usize {
        self.origins.len()
    }

    pub fn is_monitoring(&self, origin: &Origin) -> bool {
        self.origins.contains_key(origin)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Health monitor starting");

        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every monitored origin once.
    pub async fn check_all(&self) {
        let origins: Vec<Origin> = self.origins.iter().map(|entry| entry.key().clone()).collect();
        let probes = origins.iter().map(|origin| self.check.check(origin));
        let results = join_all(probes).await;

        for (origin, health) in origins.iter().zip(results) {
            // Monitoring may have stopped while the probe was in flight.
            let Some(counters) = self.origins.get(origin).map(|entry| Arc::clone(entry.value())) else {
                continue;
            };
            match health {
                OriginHealth::Healthy => {
                    if counters.mark_success(self.healthy_threshold) {
                        self.notify(origin, OriginHealth::Healthy);
                    }
                }
                OriginHealth::Unhealthy => {
                    if counters.mark_failure(self.unhealthy_threshold) {
                        self.notify(origin, OriginHealth::Unhealthy);
                    }
                }
            }
        }
    }

    fn notify(&self, origin: &Origin, health: OriginHealth) {
        let listeners: Vec<_> = {
            let mut listeners = self.listeners.lock().unwrap_or_else(|p| p.into_inner());
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            match health {
                OriginHealth::Healthy => listener.origin_healthy(origin),
                OriginHealth::Unhealthy => listener.origin_unhealthy(origin),
            }
        }
    }
}

impl OriginHealthMonitor for ScheduledHealthMonitor {
    fn monitor(&self, origins: &[Origin]) {
        for origin in origins {
            self.origins.entry(origin.clone()).or_default();
            tracing::debug!(origin = %origin, "Health monitoring started");
        }
    }

    fn stop_monitoring(&self, origins: &[Origin]) {
        for origin in origins {
            if self.origins.remove(origin).is_some() {
                tracing::debug!(origin = %origin, "Health monitoring stopped");
            }
        }
    }

    fn add_listener(&self, listener: Weak<dyn HealthStatusListener>) {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner()).push(listener);
    }
}
