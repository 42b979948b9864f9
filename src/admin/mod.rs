//! Admin API.
//!
//! # Data Flow
//! ```text
//! Bearer token check (auth.rs)
//!     → GET  /admin/status, /admin/origins, /admin/origins/{app}
//!            read inventories directly
//!     → POST /admin/origins/{app}/{origin}/enable|disable
//!            OriginsCommand over the OriginsBus → inventory transition
//! ```

pub mod auth;
pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::inventory::{OriginsBus, OriginsInventory};
use crate::origin::AppId;

#[derive(Clone)]
pub struct AdminState {
    pub inventories: Arc<HashMap<AppId, Arc<OriginsInventory>>>,
    pub bus: Arc<OriginsBus>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(
        inventories: impl IntoIterator<Item = Arc<OriginsInventory>>,
        bus: Arc<OriginsBus>,
        api_key: &str,
    ) -> Self {
        let inventories = inventories
            .into_iter()
            .map(|inventory| (inventory.app_id().clone(), inventory))
            .collect();
        Self {
            inventories: Arc::new(inventories),
            bus,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/origins", get(get_origins))
        .route("/admin/origins/{app}", get(get_application))
        .route("/admin/origins/{app}/{origin}/enable", post(enable_origin))
        .route("/admin/origins/{app}/{origin}/disable", post(disable_origin))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::NoHealthMonitor;
    use crate::inventory::OriginState;
    use crate::origin::Origin;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state() -> (AdminState, Arc<OriginsInventory>) {
        let bus = Arc::new(OriginsBus::new());
        let inventory = OriginsInventory::builder("shop")
            .health_monitor(Arc::new(NoHealthMonitor))
            .bus(bus.clone())
            .initial_origins([
                Origin::new("shop", "a", "127.0.0.1", 9000),
                Origin::new("shop", "b", "127.0.0.1", 9001),
            ])
            .build();
        (AdminState::new([inventory.clone()], bus, "secret"), inventory)
    }

    fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let (state, _inventory) = state();
        let app = setup_admin_router(state);

        let response = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request("GET", "/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lists_origins() {
        let (state, _inventory) = state();
        let app = setup_admin_router(state);

        let response = app.oneshot(request("GET", "/admin/origins/shop", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["app_id"], "shop");
        assert_eq!(json["active"], serde_json::json!(["a", "b"]));
        assert_eq!(json["origins"][0]["state"], "ACTIVE");
    }

    #[tokio::test]
    async fn disables_and_enables_through_the_bus() {
        let (state, inventory) = state();
        let app = setup_admin_router(state);

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/origins/shop/a/disable", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(inventory.state_of(&"a".into()), Some(OriginState::Disabled));

        let response = app
            .oneshot(request("POST", "/admin/origins/shop/a/enable", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // Re-enabled origins wait for a health check before taking traffic.
        assert_eq!(inventory.state_of(&"a".into()), Some(OriginState::Inactive));
    }

    #[tokio::test]
    async fn unknown_targets_are_not_found() {
        let (state, _inventory) = state();
        let app = setup_admin_router(state);

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/origins/shop/zzz/disable", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(request("GET", "/admin/origins/cart", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
