//! Route matching logic.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive, segment aligned)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Empty condition = always matches (wildcard)
//! - No regex in the hot path

use http::header::HOST;
use http::request::Parts;

/// The parts of a request routing looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RequestHead<'a> {
    pub fn from_parts(parts: &'a Parts) -> Self {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| parts.uri.host());
        Self {
            host,
            path: parts.uri.path(),
        }
    }
}

pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, head: &RequestHead<'_>) -> bool;
}

#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        head.host
            .map(|h| h.rsplit_once(':').map_or(h, |(name, _)| name))
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.expected_host))
    }
}

/// Matches `prefix` itself and anything below it: `/shop` matches `/shop`
/// and `/shop/cart` but not `/shopping`.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        let Some(rest) = head.path.strip_prefix(&self.prefix) else {
            return false;
        };
        self.prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')
    }
}

#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, head: &RequestHead<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(head))
    }
}
