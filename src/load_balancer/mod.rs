//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher builds Preferences from request cookies
//!     (sticky origin, restriction patterns, already-tried origins)
//!     → origin_restriction.rs (keep only origins matching the cookie patterns)
//!     → sticky_session.rs (preferred origin first, if still active)
//!     → round_robin.rs / least_busy.rs / adaptive.rs / power_of_two.rs
//!       (order the active snapshot)
//!     → ordered Vec<RemoteHost>; the dispatcher tries the first
//! ```
//!
//! # Design Decisions
//! - Strategies never block; they read the inventory's current snapshot
//! - Only ACTIVE origins are ever voted for
//! - Already-tried origins are excluded at every level

pub mod adaptive;
pub mod least_busy;
pub mod origin_restriction;
pub mod power_of_two;
pub mod round_robin;
pub mod sticky_session;

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::client::DispatchError;
use crate::message::{LiveRequest, LiveResponse};
use crate::origin::{Origin, OriginId};

pub use adaptive::Adaptive;
pub use least_busy::LeastBusy;
pub use origin_restriction::OriginRestriction;
pub use power_of_two::PowerOfTwo;
pub use round_robin::RoundRobin;
pub use sticky_session::StickySession;

/// Sends requests to one origin.
pub trait HostClient: Send + Sync {
    fn send(&self, request: LiveRequest) -> BoxFuture<'static, Result<LiveResponse, DispatchError>>;

    /// Lower means less loaded.
    fn load_balancing_metric(&self) -> usize;
}

/// An origin paired with the client that reaches it.
#[derive(Clone)]
pub struct RemoteHost {
    origin: Origin,
    client: Arc<dyn HostClient>,
}

impl RemoteHost {
    pub fn new(origin: Origin, client: Arc<dyn HostClient>) -> Self {
        Self { origin, client }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn id(&self) -> &OriginId {
        self.origin.id()
    }

    pub fn client(&self) -> &Arc<dyn HostClient> {
        &self.client
    }
}

impl fmt::Debug for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHost").field("origin", &self.origin).finish()
    }
}

impl PartialEq for RemoteHost {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin
    }
}

/// Source of the currently ACTIVE origins.
pub trait ActiveOrigins: Send + Sync {
    fn snapshot(&self) -> Vec<RemoteHost>;
}

/// Request-scoped selection hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    /// Origin named by the sticky-session cookie.
    pub sticky_origin: Option<OriginId>,
    /// Comma-separated origin id patterns from the restriction cookie.
    pub restriction: Option<String>,
    /// Origins already tried for this request.
    pub avoid: Vec<OriginId>,
}

impl Preferences {
    pub fn avoids(&self, id: &OriginId) -> bool {
        self.avoid.contains(id)
    }
}

pub trait LoadBalancer: Send + Sync {
    /// Candidates in the order they should be tried.
    fn vote(&self, preferences: &Preferences) -> Vec<RemoteHost>;

    fn choose(&self, preferences: &Preferences) -> Option<RemoteHost> {
        self.vote(preferences).into_iter().next()
    }
}

/// Active snapshot minus the origins to avoid, in inventory order.
fn eligible(origins: &dyn ActiveOrigins, preferences: &Preferences) -> Vec<RemoteHost> {
    origins
        .snapshot()
        .into_iter()
        .filter(|host| !preferences.avoids(host.id()))
        .collect()
}
