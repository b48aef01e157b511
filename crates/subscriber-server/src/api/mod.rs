//! API module for the subscriber server

pub mod error;
pub mod handlers;
pub mod json;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use handlers::callback::ON_SUBSCRIBE_SUFFIX;
use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "subscriber",
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.service.readiness().await {
        Ok(counts) => Json(ReadyResponse {
            ready: true,
            subscriptions: Some(counts),
            error: None,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    subscriptions: None,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Create the API router
///
/// `/on_subscribe` and every configured callback path are routed
/// explicitly; other POSTs ending in `/on_subscribe` reach the fallback.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let callback_paths: BTreeSet<String> = std::iter::once(ON_SUBSCRIBE_SUFFIX.to_string())
        .chain(state.callback_paths.iter().cloned())
        .collect();

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Subscription endpoints
        .route(
            "/subscribe",
            post(handlers::create_subscription).patch(handlers::update_subscription),
        )
        .route("/updateStatus", post(handlers::update_status))
        .route(
            "/subscriptions/{subscriber_id}/{key_id}",
            get(handlers::get_subscription),
        );

    // Registry callbacks
    for path in &callback_paths {
        router = router.route(path, post(handlers::on_subscribe));
    }

    router
        .fallback(handlers::fallback)
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
