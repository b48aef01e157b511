//! Registry challenge callback
//!
//! The registry proves the subscriber holds its encryption key by sending an
//! encrypted challenge to `/on_subscribe` (or a configured callback path) and
//! expecting the plaintext back in the same response.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::api::error::ApiError;
use crate::api::json::ApiJson;

/// Path suffix served by the fallback handler
pub const ON_SUBSCRIBE_SUFFIX: &str = "/on_subscribe";

/// Body of an `OnSubscribe` callback
#[derive(Debug, Deserialize)]
pub struct OnSubscribeBody {
    pub subscriber_id: String,

    /// Omitted by registries that address subscribers by ID only
    #[serde(default)]
    pub key_id: Option<String>,

    pub challenge: String,
}

/// Response to an `OnSubscribe` callback
#[derive(Debug, Serialize, Deserialize)]
pub struct OnSubscribeResponse {
    pub answer: String,
}

/// Answer a registry challenge
///
/// POST /on_subscribe
pub async fn on_subscribe(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<OnSubscribeBody>,
) -> Result<Json<OnSubscribeResponse>, ApiError> {
    answer(&state, body).await
}

/// Serve unrouted requests
///
/// Any POST whose path ends in `/on_subscribe` is treated as a challenge
/// callback, for registries that append the suffix to the subscriber's
/// registered URL. Everything else is a 404.
pub async fn fallback(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Result<Json<OnSubscribeResponse>, ApiError> {
    if method != Method::POST || !uri.path().ends_with(ON_SUBSCRIBE_SUFFIX) {
        return Err(ApiError::NotFound(format!("No route for {} {}", method, uri.path())));
    }

    debug!(path = %uri.path(), "Serving challenge callback on suffix route");
    let body: OnSubscribeBody =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    answer(&state, body).await
}

async fn answer(state: &AppState, body: OnSubscribeBody) -> Result<Json<OnSubscribeResponse>, ApiError> {
    let answer = state
        .service
        .on_subscribe(&body.subscriber_id, body.key_id.as_deref(), &body.challenge)
        .await?;
    Ok(Json(OnSubscribeResponse { answer }))
}
