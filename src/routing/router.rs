//! Route lookup.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Higher priority first; among equal priorities the longer path prefix wins,
//!   then configuration order
//! - Explicit `None` rather than a silent default

use crate::config::schema::ApplicationConfig;
use crate::origin::AppId;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestHead};

#[derive(Debug)]
struct Route {
    app_id: AppId,
    priority: u32,
    prefix_len: usize,
    matcher: AndMatcher,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(applications: &[ApplicationConfig]) -> Self {
        let mut routes: Vec<Route> = applications
            .iter()
            .map(|app| {
                let prefix = PathPrefixMatcher::new(app.path_prefix.clone());
                let prefix_len = prefix.len();
                let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(prefix)];
                if let Some(host) = &app.host {
                    matchers.push(Box::new(HostMatcher::new(host.clone())));
                }
                Route {
                    app_id: AppId::from(app.id.as_str()),
                    priority: app.priority,
                    prefix_len,
                    matcher: AndMatcher::new(matchers),
                }
            })
            .collect();

        // Stable sort keeps configuration order for ties.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.prefix_len.cmp(&a.prefix_len)));
        Self { routes }
    }

    pub fn route(&self, head: &RequestHead<'_>) -> Option<&AppId> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(head))
            .map(|route| &route.app_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, prefix: &str, host: Option<&str>, priority: u32) -> ApplicationConfig {
        ApplicationConfig {
            id: id.to_string(),
            path_prefix: prefix.to_string(),
            host: host.map(str::to_string),
            priority,
            ..ApplicationConfig::default()
        }
    }

    fn route<'a>(router: &'a Router, host: Option<&str>, path: &str) -> Option<&'a str> {
        router.route(&RequestHead { host, path }).map(|id| id.as_str())
    }

    #[test]
    fn longest_prefix_wins_at_equal_priority() {
        let router = Router::new(&[app("root", "/", None, 0), app("shop", "/shop", None, 0)]);
        assert_eq!(route(&router, None, "/shop/cart"), Some("shop"));
        assert_eq!(route(&router, None, "/about"), Some("root"));
    }

    #[test]
    fn priority_beats_prefix_length() {
        let router = Router::new(&[app("shop", "/shop", None, 0), app("catch", "/", None, 10)]);
        assert_eq!(route(&router, None, "/shop"), Some("catch"));
    }

    #[test]
    fn host_condition_applies() {
        let router = Router::new(&[app("api", "/", Some("api.example.com"), 0)]);
        assert_eq!(route(&router, Some("api.example.com"), "/x"), Some("api"));
        assert_eq!(route(&router, Some("www.example.com"), "/x"), None);
    }
}
