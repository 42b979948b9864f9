//! Health probes.
//!
//! # Responsibilities
//! - Probe one origin and report healthy/unhealthy
//! - HTTP GET probe with timeout as the default implementation

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::Request;
use http_body_util::Empty;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::time;
use url::Url;

use crate::config::schema::HealthCheckConfig;
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginHealth {
    Healthy,
    Unhealthy,
}

pub trait HealthCheck: Send + Sync {
    fn check(&self, origin: &Origin) -> BoxFuture<'static, OriginHealth>;
}

/// `GET <path>` against the origin; any 2xx within the timeout is healthy.
pub struct HttpHealthCheck {
    client: Client<HttpConnector, Empty<Bytes>>,
    path: String,
    timeout: Duration,
}

impl HttpHealthCheck {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            path: path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.path.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn probe_url(&self, origin: &Origin) -> Result<Url, url::ParseError> {
        Url::parse(&format!("http://{}", origin.host_and_port()))?.join(&self.path)
    }
}

impl HealthCheck for HttpHealthCheck {
    fn check(&self, origin: &Origin) -> BoxFuture<'static, OriginHealth> {
        let client = self.client.clone();
        let timeout = self.timeout;
        let origin = origin.clone();
        let url = self.probe_url(&origin);

        Box::pin(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(origin = %origin, error = %e, "Invalid health check URL");
                    return OriginHealth::Unhealthy;
                }
            };

            let request = match Request::get(url.as_str())
                .header("user-agent", "origin-dispatch-health-check")
                .body(Empty::<Bytes>::new())
            {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!(origin = %origin, error = %e, "Failed to build health check request");
                    return OriginHealth::Unhealthy;
                }
            };

            match time::timeout(timeout, client.request(request)).await {
                Ok(Ok(response)) if response.status().is_success() => OriginHealth::Healthy,
                Ok(Ok(response)) => {
                    tracing::warn!(origin = %origin, status = %response.status(), "Health check failed: non-success status");
                    OriginHealth::Unhealthy
                }
                Ok(Err(e)) => {
                    tracing::warn!(origin = %origin, error = %e, "Health check failed: connection error");
                    OriginHealth::Unhealthy
                }
                Err(_) => {
                    tracing::warn!(origin = %origin, "Health check failed: timeout");
                    OriginHealth::Unhealthy
                }
            }
        })
    }
}
