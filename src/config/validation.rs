//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: &ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted, at startup and on every reload

use std::collections::HashSet;

use crate::client::RegexRewrite;
use crate::config::schema::{ApplicationConfig, LoadBalancingStrategy, ProxyConfig};
use crate::origin::Origin;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("application id must not be empty")]
    EmptyApplicationId,

    #[error("duplicate application id '{0}'")]
    DuplicateApplication(String),

    #[error("application '{app}': duplicate origin id '{origin}'")]
    DuplicateOrigin { app: String, origin: String },

    #[error("application '{app}': origin '{origin}' has invalid address '{address}'")]
    InvalidOriginAddress { app: String, origin: String, address: String },

    #[error("application '{app}': path_prefix '{prefix}' must start with '/'")]
    InvalidPathPrefix { app: String, prefix: String },

    #[error("application '{app}': {field} must be greater than zero")]
    ZeroLimit { app: String, field: &'static str },

    #[error("application '{app}': invalid rewrite pattern '{pattern}': {reason}")]
    InvalidRewrite { app: String, pattern: String, reason: String },

    #[error("health_check.{0} must be greater than zero")]
    InvalidHealthCheck(&'static str),

    #[error("admin API enabled with the placeholder api_key")]
    InsecureAdminKey,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut app_ids = HashSet::new();
    for app in &config.applications {
        if app.id.is_empty() {
            errors.push(ValidationError::EmptyApplicationId);
        } else if !app_ids.insert(app.id.as_str()) {
            errors.push(ValidationError::DuplicateApplication(app.id.clone()));
        }
        validate_application(app, &mut errors);
    }

    let health = &config.health_check;
    if health.enabled {
        if health.interval_secs == 0 {
            errors.push(ValidationError::InvalidHealthCheck("interval_secs"));
        }
        if health.timeout_secs == 0 {
            errors.push(ValidationError::InvalidHealthCheck("timeout_secs"));
        }
    }

    if config.admin.enabled && config.admin.api_key == crate::config::schema::AdminConfig::default().api_key {
        errors.push(ValidationError::InsecureAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_application(app: &ApplicationConfig, errors: &mut Vec<ValidationError>) {
    let mut origin_ids = HashSet::new();
    for origin in &app.origins {
        if !origin_ids.insert(origin.id.as_str()) {
            errors.push(ValidationError::DuplicateOrigin {
                app: app.id.clone(),
                origin: origin.id.clone(),
            });
        }
        if Origin::from_address(app.id.as_str(), origin.id.as_str(), &origin.address).is_err() {
            errors.push(ValidationError::InvalidOriginAddress {
                app: app.id.clone(),
                origin: origin.id.clone(),
                address: origin.address.clone(),
            });
        }
    }

    if !app.path_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPathPrefix {
            app: app.id.clone(),
            prefix: app.path_prefix.clone(),
        });
    }

    let pool = &app.connection_pool;
    let limits = [
        ("connection_pool.max_connections_per_host", pool.max_connections_per_host),
        ("connection_pool.max_pending_connections_per_host", pool.max_pending_connections_per_host),
        ("max_request_body_bytes", app.max_request_body_bytes),
    ];
    for (field, value) in limits {
        if value == 0 {
            errors.push(ValidationError::ZeroLimit {
                app: app.id.clone(),
                field,
            });
        }
    }
    if app.load_balancing == LoadBalancingStrategy::Adaptive && app.adaptive_request_count == 0 {
        errors.push(ValidationError::ZeroLimit {
            app: app.id.clone(),
            field: "adaptive_request_count",
        });
    }
    if app.sticky_session.enabled && app.sticky_session.timeout_secs == 0 {
        errors.push(ValidationError::ZeroLimit {
            app: app.id.clone(),
            field: "sticky_session.timeout_secs",
        });
    }

    for rewrite in &app.rewrites {
        if let Err(e) = RegexRewrite::from_config(rewrite) {
            errors.push(ValidationError::InvalidRewrite {
                app: app.id.clone(),
                pattern: rewrite.url_pattern.clone(),
                reason: e.to_string(),
            });
        }
    }
}
