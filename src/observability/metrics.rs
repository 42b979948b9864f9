//! Metrics collection and exposition.
//!
//! # Metrics
//! - `origin_status` (gauge, app/origin): ACTIVE=1, INACTIVE=0, DISABLED=-1
//! - `origin_response_status_total` (counter, app/status): responses with status >= 400
//! - `dispatch_attempts_total` (counter, app/outcome): one per attempt
//! - `pool_busy_connections` (gauge, app/origin): lent plus opening connections
//! - `proxy_requests_total` (counter, app/method/status)
//! - `proxy_request_duration_seconds` (histogram, app)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::inventory::OriginState;
use crate::origin::{AppId, Origin};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_origin_status(origin: &Origin, state: OriginState) {
    gauge!(
        "origin_status",
        "app" => origin.app_id().to_string(),
        "origin" => origin.id().to_string()
    )
    .set(state.gauge_value());
}

/// Stop exporting a removed origin's status.
pub fn remove_origin_status(origin: &Origin) {
    // The facade has no deregistration; NaN marks the series stale for scrapers.
    gauge!(
        "origin_status",
        "app" => origin.app_id().to_string(),
        "origin" => origin.id().to_string()
    )
    .set(f64::NAN);
}

pub fn record_pool_busy(origin: &Origin, busy: usize) {
    gauge!(
        "pool_busy_connections",
        "app" => origin.app_id().to_string(),
        "origin" => origin.id().to_string()
    )
    .set(busy as f64);
}

pub fn record_response_status(app_id: &AppId, status: u16) {
    if status >= 400 {
        counter!(
            "origin_response_status_total",
            "app" => app_id.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }
}

pub fn record_dispatch_attempt(app_id: &AppId, outcome: &'static str) {
    counter!("dispatch_attempts_total", "app" => app_id.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_request(app: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "app" => app.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "app" => app.to_string()).record(start.elapsed().as_secs_f64());
}
