//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create the axum router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request id)
//! - Route each request to its application's dispatcher
//! - Cancel the dispatch when the client goes away

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::client::BackendServiceClient;
use crate::http::request::{into_live_request, request_id};
use crate::http::response::{error_response, into_axum_response};
use crate::net::Transaction;
use crate::observability::metrics;
use crate::origin::AppId;
use crate::routing::{RequestHead, Router as ProxyRouter};

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub services: Arc<HashMap<AppId, Arc<BackendServiceClient>>>,
}

impl AppState {
    pub fn new(router: ProxyRouter, services: impl IntoIterator<Item = Arc<BackendServiceClient>>) -> Self {
        let services = services
            .into_iter()
            .map(|service| (service.app_id().clone(), service))
            .collect();
        Self {
            router: Arc::new(router),
            services: Arc::new(services),
        }
    }
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving on a custom listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until the shutdown signal fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let routed = state.router.route(&RequestHead::from_parts(&parts)).cloned();
    let Some(service) = routed.as_ref().and_then(|app_id| state.services.get(app_id)) else {
        tracing::warn!(request_id = %request_id, path = %parts.uri.path(), "No application matched");
        metrics::record_request("none", &method, 404, start);
        return (StatusCode::NOT_FOUND, "No matching application").into_response();
    };
    let app = service.app_id().as_str().to_owned();

    tracing::debug!(
        request_id = %request_id,
        app = %app,
        method = %method,
        path = %parts.uri.path(),
        "Dispatching request"
    );

    // Dropping this future (client gone, timeout) cancels the dispatch.
    let transaction = Transaction::new();
    let guard = transaction.cancel_on_drop();
    let result = service
        .send_request(into_live_request(Request::from_parts(parts, body)), &transaction)
        .await;
    guard.disarm();

    match result {
        Ok(response) => {
            metrics::record_request(&app, &method, response.status().as_u16(), start);
            into_axum_response(response)
        }
        Err(e) => {
            let response = error_response(&e);
            tracing::warn!(
                request_id = %request_id,
                app = %app,
                error = %e,
                status = %response.status(),
                "Dispatch failed"
            );
            metrics::record_request(&app, &method, response.status().as_u16(), start);
            response
        }
    }
}
