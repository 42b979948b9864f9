//! The retrying dispatcher for one backend application.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{CONTENT_LENGTH, HOST, SET_COOKIE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};

use crate::client::error::DispatchError;
use crate::client::rewrite::RewriteRuleset;
use crate::config::schema::StickySessionConfig;
use crate::load_balancer::{LoadBalancer, Preferences, RemoteHost};
use crate::message::{self, request_cookie, LiveRequest, LiveResponse, ResponseCookie};
use crate::net::Transaction;
use crate::observability::metrics;
use crate::origin::{AppId, Origin, OriginId};
use crate::resilience::{RequestSummary, RetryContext, RetryNTimes, RetryPolicy};
use crate::stream::ByteStream;

/// Upper bound on attempts for one request, whatever the retry policy says.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

pub const DEFAULT_ORIGIN_ID_HEADER: &str = "x-origin-id";

/// Name of the sticky-session cookie for an application.
pub fn sticky_cookie_name(app_id: &AppId) -> String {
    format!("origin_{app_id}")
}

pub struct BackendServiceClientBuilder {
    app_id: AppId,
    load_balancer: Arc<dyn LoadBalancer>,
    retry_policy: Arc<dyn RetryPolicy>,
    rewrites: RewriteRuleset,
    sticky_session: StickySessionConfig,
    restriction_cookie: Option<String>,
    origin_id_header: HeaderName,
    override_host_header: bool,
    max_request_body_bytes: usize,
}

impl BackendServiceClientBuilder {
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn rewrites(mut self, rewrites: RewriteRuleset) -> Self {
        self.rewrites = rewrites;
        self
    }

    pub fn sticky_session(mut self, config: StickySessionConfig) -> Self {
        self.sticky_session = config;
        self
    }

    pub fn origin_restriction_cookie(mut self, name: Option<String>) -> Self {
        self.restriction_cookie = name;
        self
    }

    pub fn origin_id_header(mut self, name: HeaderName) -> Self {
        self.origin_id_header = name;
        self
    }

    pub fn override_host_header(mut self, enabled: bool) -> Self {
        self.override_host_header = enabled;
        self
    }

    pub fn max_request_body_bytes(mut self, max: usize) -> Self {
        self.max_request_body_bytes = max;
        self
    }

    pub fn build(self) -> BackendServiceClient {
        BackendServiceClient {
            sticky_cookie: sticky_cookie_name(&self.app_id),
            app_id: self.app_id,
            load_balancer: self.load_balancer,
            retry_policy: self.retry_policy,
            rewrites: self.rewrites,
            sticky_session: self.sticky_session,
            restriction_cookie: self.restriction_cookie,
            origin_id_header: self.origin_id_header,
            override_host_header: self.override_host_header,
            max_request_body_bytes: self.max_request_body_bytes,
        }
    }
}

/// The request as received, with its body held for replay across attempts.
struct Replayable {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Replayable {
    fn attempt(&self, host: &RemoteHost, override_host: bool) -> LiveRequest {
        let body = match &self.body {
            Some(bytes) => ByteStream::from_bytes(bytes.clone()),
            None => ByteStream::empty(),
        };
        let mut request = LiveRequest::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();

        if override_host {
            if let Ok(value) = HeaderValue::from_str(&host.origin().host_and_port()) {
                request.headers_mut().insert(HOST, value);
            }
        }
        request
    }
}

/// Sends requests to one backend application's origins, retrying failed
/// attempts on other origins.
///
/// # Algorithm
/// ```text
/// rewrite URL (first matching rule)
/// loop:
///     attempt >= MAX_RETRY_ATTEMPTS → NoAvailableHosts
///     choose a host avoiding every origin already tried
///     none → NoAvailableHosts as the failure
///     send; success → shape response, tag origin id and sticky cookie
///     failure → retry policy decides: next attempt or surface the failure
/// ```
pub struct BackendServiceClient {
    app_id: AppId,
    load_balancer: Arc<dyn LoadBalancer>,
    retry_policy: Arc<dyn RetryPolicy>,
    rewrites: RewriteRuleset,
    sticky_session: StickySessionConfig,
    sticky_cookie: String,
    restriction_cookie: Option<String>,
    origin_id_header: HeaderName,
    override_host_header: bool,
    max_request_body_bytes: usize,
}

impl BackendServiceClient {
    pub fn builder(app_id: impl Into<AppId>, load_balancer: Arc<dyn LoadBalancer>) -> BackendServiceClientBuilder {
        BackendServiceClientBuilder {
            app_id: app_id.into(),
            load_balancer,
            retry_policy: Arc::new(RetryNTimes::default()),
            rewrites: RewriteRuleset::default(),
            sticky_session: StickySessionConfig::default(),
            restriction_cookie: None,
            origin_id_header: HeaderName::from_static(DEFAULT_ORIGIN_ID_HEADER),
            override_host_header: false,
            max_request_body_bytes: 1024 * 1024,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn load_balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.load_balancer
    }

    /// Dispatch `request`, stopping at the next suspension point once
    /// `transaction` is cancelled.
    pub async fn send_request(
        &self,
        request: LiveRequest,
        transaction: &Transaction,
    ) -> Result<LiveResponse, DispatchError> {
        let request = self.rewrite(request);
        let replayable = tokio::select! {
            prepared = self.prepare(request) => prepared?,
            _ = transaction.cancelled() => return Err(DispatchError::Cancelled),
        };
        let summary = RequestSummary {
            method: replayable.method.clone(),
            uri: replayable.uri.clone(),
        };
        let base = self.preferences(&replayable.headers);

        let mut previous: Vec<RemoteHost> = Vec::new();
        let mut next_hint: Option<RemoteHost> = None;
        let mut attempt: u32 = 0;

        loop {
            if attempt >= MAX_RETRY_ATTEMPTS {
                return Err(DispatchError::NoAvailableHosts {
                    app_id: self.app_id.clone(),
                });
            }
            if transaction.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            let preferences = Self::avoiding(&base, &previous);
            let chosen = next_hint.take().or_else(|| self.load_balancer.choose(&preferences));

            let error = match chosen {
                None => {
                    metrics::record_dispatch_attempt(&self.app_id, "no_host");
                    tracing::warn!(app = %self.app_id, attempt = attempt + 1, "No available hosts");
                    DispatchError::NoAvailableHosts {
                        app_id: self.app_id.clone(),
                    }
                }
                Some(host) => {
                    let outbound = replayable.attempt(&host, self.override_host_header);
                    let result = tokio::select! {
                        result = host.client().send(outbound) => result,
                        _ = transaction.cancelled() => Err(DispatchError::Cancelled),
                    };
                    match result {
                        Ok(response) => {
                            metrics::record_dispatch_attempt(&self.app_id, "success");
                            return Ok(self.shape_response(&replayable.method, host.origin(), response));
                        }
                        Err(DispatchError::Cancelled) => {
                            metrics::record_dispatch_attempt(&self.app_id, "cancelled");
                            tracing::debug!(app = %self.app_id, origin = %host.origin(), "Dispatch cancelled");
                            return Err(DispatchError::Cancelled);
                        }
                        Err(error) => {
                            metrics::record_dispatch_attempt(&self.app_id, "failure");
                            tracing::error!(
                                app = %self.app_id,
                                origin = %host.origin(),
                                method = %summary.method,
                                uri = %summary.uri,
                                attempt = attempt + 1,
                                kind = error.kind(),
                                error = %error,
                                "Error handling request"
                            );
                            previous.push(host);
                            error
                        }
                    }
                }
            };

            attempt += 1;
            let context = RetryContext {
                app_id: &self.app_id,
                retry_count: attempt,
                last_error: Some(&error),
                request: &summary,
                previous_origins: &previous,
            };
            let retry_preferences = Self::avoiding(&base, &previous);
            let outcome = self
                .retry_policy
                .evaluate(&context, self.load_balancer.as_ref(), &retry_preferences);

            if !outcome.should_retry {
                tracing::debug!(app = %self.app_id, attempts = attempt, kind = error.kind(), "Not retrying");
                return Err(error);
            }
            tracing::debug!(
                app = %self.app_id,
                attempt,
                next = ?outcome.next_origin.as_ref().map(|h| h.id().to_string()),
                "Retrying request"
            );
            next_hint = outcome.next_origin.filter(|h| !previous.iter().any(|p| p.id() == h.id()));
        }
    }

    fn rewrite(&self, mut request: LiveRequest) -> LiveRequest {
        if self.rewrites.is_empty() {
            return request;
        }
        let original = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        if let Some(rewritten) = self.rewrites.rewrite(&original) {
            match rewritten.parse::<Uri>() {
                Ok(uri) => {
                    tracing::debug!(app = %self.app_id, from = %original, to = %uri, "Rewrote request URL");
                    *request.uri_mut() = uri;
                }
                Err(e) => {
                    tracing::warn!(app = %self.app_id, rewritten = %rewritten, error = %e, "Rewrite produced an invalid URL");
                }
            }
        }
        request
    }

    /// Validate framing headers and hold the body for replay.
    async fn prepare(&self, request: LiveRequest) -> Result<Replayable, DispatchError> {
        let (parts, body) = request.into_parts();
        let body = if message::has_body(&parts.headers)? {
            let aggregated = body.aggregate(self.max_request_body_bytes).await?;
            Some(aggregated.into_bytes())
        } else {
            // A body the headers do not declare is not forwarded.
            tokio::spawn(drain(body));
            None
        };
        Ok(Replayable {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
        })
    }

    fn preferences(&self, headers: &HeaderMap) -> Preferences {
        let sticky_origin = if self.sticky_session.enabled {
            request_cookie(headers, &self.sticky_cookie).map(OriginId::from)
        } else {
            None
        };
        let restriction = self
            .restriction_cookie
            .as_deref()
            .and_then(|name| request_cookie(headers, name));

        Preferences {
            sticky_origin,
            restriction,
            avoid: Vec::new(),
        }
    }

    fn avoiding(base: &Preferences, previous: &[RemoteHost]) -> Preferences {
        Preferences {
            avoid: previous.iter().map(|h| h.id().clone()).collect(),
            ..base.clone()
        }
    }

    fn shape_response(&self, method: &Method, origin: &Origin, response: LiveResponse) -> LiveResponse {
        let (mut parts, body) = response.into_parts();
        metrics::record_response_status(&self.app_id, parts.status.as_u16());

        let body = if *method == Method::HEAD || is_bodiless(parts.status) {
            tokio::spawn(drain(body));
            parts.headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
            parts.headers.remove(TRANSFER_ENCODING);
            ByteStream::empty()
        } else {
            if parts.headers.contains_key(CONTENT_LENGTH) && message::is_chunked(&parts.headers) {
                parts.headers.remove(CONTENT_LENGTH);
            }
            body
        };

        if let Ok(value) = HeaderValue::from_str(origin.id().as_str()) {
            parts.headers.insert(self.origin_id_header.clone(), value);
        }
        if self.sticky_session.enabled {
            let cookie = ResponseCookie::new(self.sticky_cookie.as_str(), origin.id().as_str())
                .max_age(self.sticky_session.timeout_secs)
                .path("/")
                .http_only(true);
            if let Ok(value) = HeaderValue::from_str(&cookie.to_header_value()) {
                parts.headers.append(SET_COOKIE, value);
            }
        }

        LiveResponse::from_parts(parts, body)
    }
}

impl std::fmt::Debug for BackendServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendServiceClient")
            .field("app_id", &self.app_id)
            .field("sticky_session", &self.sticky_session)
            .field("rewrites", &self.rewrites)
            .field("override_host_header", &self.override_host_header)
            .finish()
    }
}

fn is_bodiless(status: StatusCode) -> bool {
    status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED || status.is_informational()
}

/// Consume and release a body nobody will read, so its connection can be reused.
async fn drain(body: ByteStream) {
    let mut discarded = body.discard();
    while discarded.next().await.is_some() {}
}
