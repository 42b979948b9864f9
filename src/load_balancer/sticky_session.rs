//! Sticky-session strategy.

use std::sync::Arc;

use crate::load_balancer::{ActiveOrigins, LoadBalancer, Preferences, RemoteHost};

/// Puts the origin named by the sticky-session cookie first while it is
/// still active; otherwise defers to the delegate.
pub struct StickySession {
    origins: Arc<dyn ActiveOrigins>,
    delegate: Arc<dyn LoadBalancer>,
}

impl StickySession {
    pub fn new(origins: Arc<dyn ActiveOrigins>, delegate: Arc<dyn LoadBalancer>) -> Self {
        Self { origins, delegate }
    }
}

impl LoadBalancer for StickySession {
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost> {
        let preferred = preferences
            .sticky_origin
            .as_ref()
            .filter(|id| !preferences.avoids(id))
            .and_then(|id| self.origins.snapshot().into_iter().find(|host| host.id() == id));

        match preferred {
            Some(preferred) => {
                let preferred_id = preferred.id().clone();
                let mut hosts = vec![preferred];
                hosts.extend(
                    self.delegate
                        .vote(preferences)
                        .into_iter()
                        .filter(|host| *host.id() != preferred_id),
                );
                hosts
            }
            None => self.delegate.vote(preferences),
        }
    }
}
