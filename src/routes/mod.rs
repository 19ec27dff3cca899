//! HTTP/WebSocket routes

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use http::Method;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge::ws_bridge_handler;
use crate::state::AppState;

/// Build the application router: a health check and the bridging WebSocket
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/ws", get(ws_bridge_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            upstream_endpoint: "https://example.invalid".into(),
        }))
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = create_router(test_state());
        let rsp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_http() {
        let app = create_router(test_state());
        let rsp = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // Upgrade headers are required
        assert_ne!(rsp.status(), StatusCode::OK);
    }
}
