//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{eligible, ActiveOrigins, LoadBalancer, Preferences, RemoteHost};

/// Rotates the starting point over the active origins on every vote.
pub struct RoundRobin {
    origins: Arc<dyn ActiveOrigins>,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(origins: Arc<dyn ActiveOrigins>) -> Self {
        Self {
            origins,
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for RoundRobin {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let mut hosts = eligible(self.origins.as_ref(), preferences);
        if hosts.is_empty() {
            return hosts;
        }
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.rotate_left(start);
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::{ids, StaticOrigins};

    fn pick(lb: &RoundRobin) -> String {
        lb.choose(&Preferences::default()).unwrap().id().to_string()
    }

    #[test]
    fn rotates_through_active_origins() {
        let lb = RoundRobin::new(StaticOrigins::of(&["1", "2", "3"]));
        let picks: Vec<_> = (0..4).map(|_| pick(&lb)).collect();
        assert_eq!(picks, ["1", "2", "3", "1"]);
    }

    #[test]
    fn vote_lists_every_origin_once() {
        let lb = RoundRobin::new(StaticOrigins::of(&["1", "2", "3"]));
        lb.vote(&Preferences::default());
        assert_eq!(ids(&lb.vote(&Preferences::default())), ["2", "3", "1"]);
    }

    #[test]
    fn follows_membership_changes() {
        let origins = StaticOrigins::of(&["1", "2", "3"]);
        let lb = RoundRobin::new(origins.clone());
        for _ in 0..5 {
            pick(&lb);
        }

        origins.set(&["2", "4", "6"]);

        let picks: Vec<_> = (0..3).map(|_| pick(&lb)).collect();
        assert_eq!(picks, ["6", "2", "4"]);
    }

    #[test]
    fn skips_avoided_origins() {
        let lb = RoundRobin::new(StaticOrigins::of(&["1", "2"]));
        let preferences = Preferences {
            avoid: vec!["1".into()],
            ..Default::default()
        };
        for _ in 0..3 {
            assert_eq!(lb.choose(&preferences).unwrap().id().as_str(), "2");
        }
    }

    #[test]
    fn nothing_to_vote_for() {
        let lb = RoundRobin::new(StaticOrigins::of(&[]));
        assert!(lb.choose(&Preferences::default()).is_none());
    }
}
