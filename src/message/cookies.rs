//! Cookie lookup on requests and `Set-Cookie` rendering on responses.

use std::fmt::Write;

use http::header::COOKIE;
use http::HeaderMap;

/// Value of the first request cookie called `name`.
pub fn request_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<u64>,
    pub path: Option<String>,
    pub http_only: bool,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            path: None,
            http_only: false,
        }
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut rendered = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            let _ = write!(rendered, "; Max-Age={max_age}");
        }
        if let Some(path) = &self.path {
            let _ = write!(rendered, "; Path={path}");
        }
        if self.http_only {
            rendered.push_str("; HttpOnly");
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn finds_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; origin_shop=shop-02"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));

        assert_eq!(request_cookie(&headers, "origin_shop").as_deref(), Some("shop-02"));
        assert_eq!(request_cookie(&headers, "b").as_deref(), Some("2"));
        assert_eq!(request_cookie(&headers, "missing"), None);
    }

    #[test]
    fn renders_set_cookie() {
        let cookie = ResponseCookie::new("origin_shop", "shop-01")
            .max_age(43200)
            .path("/")
            .http_only(true);
        assert_eq!(
            cookie.to_header_value(),
            "origin_shop=shop-01; Max-Age=43200; Path=/; HttpOnly"
        );
    }
}
