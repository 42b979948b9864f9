//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use origin_dispatch::config::schema::{ApplicationConfig, OriginConfig};
use origin_dispatch::config::ProxyConfig;
use origin_dispatch::lifecycle::{Proxy, Shutdown};

/// Serve `router` on an ephemeral port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An origin answering every request with `name` as the body and the
/// request path in `x-seen-path`. POST bodies are echoed after the name.
pub async fn spawn_origin(name: &'static str) -> SocketAddr {
    let router = Router::new().fallback(move |request: Request| async move {
        let path = request.uri().path().to_string();
        let host = request
            .headers()
            .get("host")
            .cloned()
            .unwrap_or(HeaderValue::from_static(""));
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert("x-seen-path", HeaderValue::from_str(&path).unwrap());
        headers.insert("x-seen-host", host);

        let mut reply = name.as_bytes().to_vec();
        if !body.is_empty() {
            reply.push(b' ');
            reply.extend_from_slice(&body);
        }
        (StatusCode::OK, headers, Bytes::from(reply)).into_response()
    });
    spawn_router(router).await
}

/// An origin that answers every connection with bytes that are not HTTP.
pub async fn spawn_garbage_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let _ = socket.write_all(b"this is not http\r\n\r\n").await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn application(id: &str, path_prefix: &str, origins: &[(&str, SocketAddr)]) -> ApplicationConfig {
    ApplicationConfig {
        id: id.to_string(),
        path_prefix: path_prefix.to_string(),
        origins: origins
            .iter()
            .map(|(origin_id, addr)| OriginConfig {
                id: origin_id.to_string(),
                address: addr.to_string(),
                tls: None,
            })
            .collect(),
        ..ApplicationConfig::default()
    }
}

pub fn proxy_config(applications: Vec<ApplicationConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.applications = applications;
    config.health_check.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub proxy: Arc<Proxy>,
    pub shutdown: Shutdown,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let proxy = Arc::new(Proxy::build(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let running = proxy.clone();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = running.run(listener, None, signal, None).await;
    });

    RunningProxy { addr, proxy, shutdown }
}

/// A client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
