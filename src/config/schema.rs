//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::origin::{InvalidAddress, Origin, TlsSettings};
use crate::pool::ConnectionPoolSettings;

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Backend applications and their origins.
    pub applications: Vec<ApplicationConfig>,

    /// Health check settings, shared by every application.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl ProxyConfig {
    pub fn application(&self, id: &str) -> Option<&ApplicationConfig> {
        self.applications.iter().find(|app| app.id == id)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one proxied request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// A backend application: a named group of origins with its own
/// dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Unique application identifier.
    pub id: String,

    /// Requests whose path starts with this prefix go to this application.
    pub path_prefix: String,

    /// Optional Host header to match (exact, case-insensitive).
    pub host: Option<String>,

    /// Route priority (higher = checked first).
    pub priority: u32,

    pub origins: Vec<OriginConfig>,

    pub connection_pool: ConnectionPoolSettings,

    pub sticky_session: StickySessionConfig,

    /// Path rewrites, first match wins.
    pub rewrites: Vec<RewriteConfig>,

    pub load_balancing: LoadBalancingStrategy,

    /// Votes per origin before `adaptive` switches from round-robin to
    /// least-busy.
    pub adaptive_request_count: usize,

    /// Cookie whose value restricts the eligible origins.
    pub origin_restriction_cookie: Option<String>,

    pub retry: RetryConfig,

    /// Replace the outbound Host header with the origin's host.
    pub override_host_header: bool,

    /// Upper bound for request bodies buffered for replay across attempts.
    pub max_request_body_bytes: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            path_prefix: "/".to_string(),
            host: None,
            priority: 0,
            origins: Vec::new(),
            connection_pool: ConnectionPoolSettings::default(),
            sticky_session: StickySessionConfig::default(),
            rewrites: Vec::new(),
            load_balancing: LoadBalancingStrategy::default(),
            adaptive_request_count: crate::load_balancer::adaptive::DEFAULT_REQUEST_COUNT,
            origin_restriction_cookie: None,
            retry: RetryConfig::default(),
            override_host_header: false,
            max_request_body_bytes: 1024 * 1024,
        }
    }
}

impl ApplicationConfig {
    /// The configured origins as inventory members.
    pub fn build_origins(&self) -> Result<Vec<Origin>, InvalidAddress> {
        self.origins
            .iter()
            .map(|origin| {
                Origin::from_address(self.id.as_str(), origin.id.as_str(), &origin.address)
                    .map(|o| o.with_tls(origin.tls.clone()))
            })
            .collect()
    }
}

/// A single origin of an application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OriginConfig {
    /// Origin identifier, unique within its application.
    pub id: String,

    /// Origin address (e.g., "127.0.0.1:3000").
    pub address: String,

    #[serde(default)]
    pub tls: Option<TlsSettings>,
}

/// Sticky-session settings for an application.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StickySessionConfig {
    pub enabled: bool,

    /// Max-Age of the sticky-session cookie.
    pub timeout_secs: u64,
}

impl Default for StickySessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 12 * 60 * 60,
        }
    }
}

/// A path rewrite: `url_pattern` must match the whole path, `replacement`
/// may refer to capture groups as `$1`, `$2`, ...
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RewriteConfig {
    pub url_pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
    LeastBusy,
    Adaptive,
    PowerOfTwo,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts are capped at three.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Placeholder; validation rejects it when the admin API is enabled.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_application_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[applications]]
            id = "shop"

            [[applications.origins]]
            id = "shop-01"
            address = "127.0.0.1:9000"
            "#,
        )
        .unwrap();

        let app = config.application("shop").unwrap();
        assert_eq!(app.path_prefix, "/");
        assert_eq!(app.load_balancing, LoadBalancingStrategy::RoundRobin);
        assert_eq!(app.retry.max_retries, 3);
        assert_eq!(app.connection_pool.max_connections_per_host, 50);
        assert!(!app.sticky_session.enabled);
        assert_eq!(app.origins[0].tls, None);
    }

    #[test]
    fn parses_strategy_and_rewrites() {
        let app: ApplicationConfig = toml::from_str(
            r#"
            id = "shop"
            load_balancing = "least_busy"

            [[rewrites]]
            url_pattern = "/old/(.*)"
            replacement = "/new/$1"
            "#,
        )
        .unwrap();

        assert_eq!(app.load_balancing, LoadBalancingStrategy::LeastBusy);
        assert_eq!(app.rewrites[0].replacement, "/new/$1");
    }

    #[test]
    fn parses_adaptive_and_power_of_two() {
        let app: ApplicationConfig = toml::from_str(
            r#"
            id = "shop"
            load_balancing = "adaptive"
            adaptive_request_count = 20
            "#,
        )
        .unwrap();
        assert_eq!(app.load_balancing, LoadBalancingStrategy::Adaptive);
        assert_eq!(app.adaptive_request_count, 20);

        let app: ApplicationConfig = toml::from_str("id = \"shop\"\nload_balancing = \"power_of_two\"").unwrap();
        assert_eq!(app.load_balancing, LoadBalancingStrategy::PowerOfTwo);
        assert_eq!(app.adaptive_request_count, 100);
    }

    #[test]
    fn builds_origins_with_tls() {
        let app: ApplicationConfig = toml::from_str(
            r#"
            id = "shop"

            [[origins]]
            id = "a"
            address = "localhost:9000"

            [[origins]]
            id = "b"
            address = "localhost:9443"
            tls = { trust_all_certs = true }
            "#,
        )
        .unwrap();

        let origins = app.build_origins().unwrap();
        assert_eq!(origins[0].to_string(), "shop:a:localhost:9000");
        assert!(origins[0].tls().is_none());
        assert!(origins[1].tls().is_some_and(|tls| tls.trust_all_certs));
    }
}
