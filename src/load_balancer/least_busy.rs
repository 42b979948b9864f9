//! Least-busy load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{eligible, ActiveOrigins, LoadBalancer, Preferences, RemoteHost};

/// Orders origins by their load-balancing metric (busy plus pending
/// connections). Ties keep inventory order.
pub struct LeastBusy {
    origins: Arc<dyn ActiveOrigins>,
}

impl LeastBusy {
    pub fn new(origins: Arc<dyn ActiveOrigins>) -> Self {
        Self { origins }
    }
}

impl LoadBalancer for LeastBusy {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let mut hosts = eligible(self.origins.as_ref(), preferences);
        hosts.sort_by_key(|host| host.client().load_balancing_metric());
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::{host_with_metric, ids, StaticOrigins};
    use std::sync::Mutex;

    fn origins(metrics: &[(&str, usize)]) -> Arc<StaticOrigins> {
        Arc::new(StaticOrigins {
            hosts: Mutex::new(metrics.iter().map(|(id, m)| host_with_metric(id, *m)).collect()),
        })
    }

    #[test]
    fn prefers_least_busy_origin() {
        let lb = LeastBusy::new(origins(&[("a", 3), ("b", 0), ("c", 1)]));
        assert_eq!(ids(&lb.vote(&Preferences::default())), ["b", "c", "a"]);
    }

    #[test]
    fn ties_keep_inventory_order() {
        let lb = LeastBusy::new(origins(&[("a", 1), ("b", 1), ("c", 0)]));
        assert_eq!(ids(&lb.vote(&Preferences::default())), ["c", "a", "b"]);
    }

    #[test]
    fn skips_avoided_origins() {
        let lb = LeastBusy::new(origins(&[("a", 0), ("b", 5)]));
        let preferences = Preferences {
            avoid: vec!["a".into()],
            ..Default::default()
        };
        assert_eq!(ids(&lb.vote(&preferences)), ["b"]);
    }
}
