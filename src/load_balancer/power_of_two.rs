//! Power-of-two-choices load balancing strategy.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::load_balancer::{eligible, ActiveOrigins, LoadBalancer, Preferences, RemoteHost};

/// Samples two distinct origins at random and puts the less busy one
/// first. The remaining origins follow in inventory order as fallbacks.
pub struct PowerOfTwo {
    origins: Arc<dyn ActiveOrigins>,
    rng: Mutex<StdRng>,
}

impl PowerOfTwo {
    pub fn new(origins: Arc<dyn ActiveOrigins>) -> Self {
        Self::with_rng(origins, StdRng::from_entropy())
    }

    pub fn with_rng(origins: Arc<dyn ActiveOrigins>, rng: StdRng) -> Self {
        Self {
            origins,
            rng: Mutex::new(rng),
        }
    }

    fn sample(&self, len: usize) -> (usize, usize) {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let first = rng.gen_range(0..len);
        let mut second = rng.gen_range(0..len - 1);
        if second >= first {
            second += 1;
        }
        (first, second)
    }
}

impl LoadBalancer for PowerOfTwo {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let mut hosts = eligible(self.origins.as_ref(), preferences);
        if hosts.len() < 2 {
            return hosts;
        }

        let (first, second) = self.sample(hosts.len());
        let metric = |i: usize| hosts[i].client().load_balancing_metric();
        let (better, worse) = if metric(second) < metric(first) {
            (second, first)
        } else {
            (first, second)
        };

        let mut ordered = Vec::with_capacity(hosts.len());
        ordered.push(hosts[better].clone());
        ordered.push(hosts[worse].clone());
        let mut index = 0;
        hosts.retain(|_| {
            let keep = index != better && index != worse;
            index += 1;
            keep
        });
        ordered.extend(hosts);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::{host_with_metric, ids, StaticOrigins};

    fn origins(metrics: &[(&str, usize)]) -> Arc<StaticOrigins> {
        Arc::new(StaticOrigins {
            hosts: Mutex::new(metrics.iter().map(|(id, m)| host_with_metric(id, *m)).collect()),
        })
    }

    #[test]
    fn busiest_origin_is_never_chosen_first() {
        let lb = PowerOfTwo::with_rng(
            origins(&[("one", 5), ("two", 6), ("three", 3), ("four", 2)]),
            StdRng::seed_from_u64(5),
        );
        for _ in 0..200 {
            let vote = ids(&lb.vote(&Preferences::default()));
            assert_ne!(vote[0], "two");
            let mut sorted = vote.clone();
            sorted.sort();
            assert_eq!(sorted, ["four", "one", "three", "two"]);
        }
    }

    #[test]
    fn chooses_the_better_of_two() {
        let lb = PowerOfTwo::with_rng(origins(&[("a", 4), ("b", 1)]), StdRng::seed_from_u64(1));
        for _ in 0..20 {
            assert_eq!(ids(&lb.vote(&Preferences::default())), ["b", "a"]);
        }
    }

    #[test]
    fn sole_or_no_origin() {
        let lb = PowerOfTwo::new(StaticOrigins::of(&["one"]));
        for _ in 0..10 {
            assert_eq!(lb.choose(&Preferences::default()).unwrap().id().as_str(), "one");
        }
        let lb = PowerOfTwo::new(StaticOrigins::of(&[]));
        assert!(lb.choose(&Preferences::default()).is_none());
    }

    #[test]
    fn skips_avoided_origins() {
        let lb = PowerOfTwo::new(origins(&[("a", 0), ("b", 9), ("c", 9)]));
        let preferences = Preferences {
            avoid: vec!["a".into()],
            ..Default::default()
        };
        for _ in 0..10 {
            assert_ne!(lb.choose(&preferences).unwrap().id().as_str(), "a");
        }
    }
}
