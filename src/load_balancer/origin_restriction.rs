//! Origin restriction by cookie.
//!
//! The restriction cookie carries comma-separated regular expressions. Only
//! origins whose id fully matches one of them stay eligible. A pattern that
//! does not compile matches nothing.

use std::sync::Arc;

use regex::Regex;

use crate::load_balancer::{LoadBalancer, Preferences, RemoteHost};

pub struct OriginRestriction {
    delegate: Arc<dyn LoadBalancer>,
}

impl OriginRestriction {
    pub fn new(delegate: Arc<dyn LoadBalancer>) -> Self {
        Self { delegate }
    }
}

/// Compile the cookie value into anchored patterns, dropping invalid ones.
pub fn restriction_patterns(value: &str) -> Vec<Regex> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .filter_map(|pattern| match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!(pattern = %pattern, error = %e, "Invalid origin restriction pattern, matching nothing");
                None
            }
        })
        .collect()
}

impl LoadBalancer for OriginRestriction {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let candidates = self.delegate.vote(preferences);
        let Some(restriction) = preferences.restriction.as_deref() else {
            return candidates;
        };

        let patterns = restriction_patterns(restriction);
        candidates
            .into_iter()
            .filter(|host| patterns.iter().any(|p| p.is_match(host.id().as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::{ids, StaticOrigins};
    use crate::load_balancer::LeastBusy;

    fn restricted(cookie: &str) -> Vec<String> {
        let lb = OriginRestriction::new(Arc::new(LeastBusy::new(StaticOrigins::of(&[
            "app-01", "app-02", "app-03", "other",
        ]))));
        let preferences = Preferences {
            restriction: Some(cookie.to_string()),
            ..Default::default()
        };
        ids(&lb.vote(&preferences))
    }

    #[test]
    fn no_cookie_means_no_restriction() {
        let lb = OriginRestriction::new(Arc::new(LeastBusy::new(StaticOrigins::of(&["a", "b"]))));
        assert_eq!(ids(&lb.vote(&Preferences::default())), ["a", "b"]);
    }

    #[test]
    fn keeps_full_matches_only() {
        assert_eq!(restricted("app-0[12]"), ["app-01", "app-02"]);
        assert_eq!(restricted("app"), Vec::<String>::new());
    }

    #[test]
    fn comma_separated_patterns_combine() {
        assert_eq!(restricted("app-03, other"), ["app-03", "other"]);
    }

    #[test]
    fn invalid_pattern_matches_nothing() {
        assert_eq!(restricted("app-(01"), Vec::<String>::new());
        assert_eq!(restricted("app-(01,other"), ["other"]);
    }
}
