//! URL rewrite rules.
//!
//! A [`RegexRewrite`] matches the whole path-and-query; its replacement may
//! refer to capture groups as `$1`, `$2`, ... An unmatched group expands to
//! nothing.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::config::schema::RewriteConfig;

pub trait RewriteRule: Send + Sync + fmt::Debug {
    /// The rewritten URL, or `None` when the rule does not apply.
    fn rewrite(&self, url: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Group(usize),
}

#[derive(Debug, Clone)]
pub struct RegexRewrite {
    pattern: Regex,
    replacement: Vec<Segment>,
}

impl RegexRewrite {
    pub fn new(url_pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("^(?:{url_pattern})$"))?;
        Ok(Self {
            pattern,
            replacement: parse_replacement(replacement),
        })
    }

    pub fn from_config(config: &RewriteConfig) -> Result<Self, regex::Error> {
        Self::new(&config.url_pattern, &config.replacement)
    }
}

fn parse_replacement(replacement: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = replacement.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        let starts_group = c == '$' && chars.peek().is_some_and(|(_, next)| next.is_ascii_digit());
        if !starts_group {
            literal.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
            digits.push(d);
            chars.next();
        }
        match digits.parse() {
            Ok(group) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Group(group));
            }
            Err(_) => {
                literal.push('$');
                literal.push_str(&digits);
            }
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

impl RewriteRule for RegexRewrite {
    fn rewrite(&self, url: &str) -> Option<String> {
        let captures = self.pattern.captures(url)?;
        let mut out = String::with_capacity(url.len());
        for segment in &self.replacement {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group(n) => {
                    if let Some(m) = captures.get(*n) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        Some(out)
    }
}

/// Ordered rules; the first one that applies wins.
#[derive(Debug, Clone, Default)]
pub struct RewriteRuleset {
    rules: Vec<Arc<dyn RewriteRule>>,
}

impl RewriteRuleset {
    pub fn new(rules: Vec<Arc<dyn RewriteRule>>) -> Self {
        Self { rules }
    }

    pub fn from_config(configs: &[RewriteConfig]) -> Result<Self, regex::Error> {
        let rules = configs
            .iter()
            .map(|config| RegexRewrite::from_config(config).map(|rule| Arc::new(rule) as Arc<dyn RewriteRule>))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rewrite(&self, url: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.rewrite(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_capture_groups() {
        let rule = RegexRewrite::new("/foo/(.*)/bar/(.*)", "/x/$2/y/$1").unwrap();
        assert_eq!(rule.rewrite("/foo/a/bar/b").as_deref(), Some("/x/b/y/a"));
    }

    #[test]
    fn pattern_must_match_whole_url() {
        let rule = RegexRewrite::new("/foo", "/bar").unwrap();
        assert_eq!(rule.rewrite("/foo/more"), None);
        assert_eq!(rule.rewrite("/foo").as_deref(), Some("/bar"));
    }

    #[test]
    fn placeholder_parsing() {
        assert_eq!(
            parse_replacement("/a/$10$2x$"),
            vec![
                Segment::Literal("/a/".into()),
                Segment::Group(10),
                Segment::Group(2),
                Segment::Literal("x$".into()),
            ]
        );
    }

    #[test]
    fn unmatched_group_expands_to_nothing() {
        let rule = RegexRewrite::new("/(a)?b", "/$1-").unwrap();
        assert_eq!(rule.rewrite("/b").as_deref(), Some("/-"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let ruleset = RewriteRuleset::from_config(&[
            RewriteConfig {
                url_pattern: "/shop/(.*)".into(),
                replacement: "/first/$1".into(),
            },
            RewriteConfig {
                url_pattern: "/shop/.*".into(),
                replacement: "/second".into(),
            },
        ])
        .unwrap();

        assert_eq!(ruleset.rewrite("/shop/cart?x=1").as_deref(), Some("/first/cart?x=1"));
        assert_eq!(ruleset.rewrite("/other"), None);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(RegexRewrite::new("/(", "/").is_err());
    }
}
