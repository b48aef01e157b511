//! Status push and lookup handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use subscriber_core::SubscriptionSummary;

use super::AppState;
use crate::api::error::ApiError;
use crate::api::json::ApiJson;

/// Body of `POST /updateStatus`
#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    pub subscriber_id: String,
    pub key_id: String,
    /// Parsed by the state machine so unknown values get the usual 400 body
    pub status: String,
}

/// Apply a status pushed by the registry
///
/// POST /updateStatus
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<StatusUpdateBody>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscription = state
        .service
        .status_update(&body.subscriber_id, &body.key_id, &body.status)
        .await?;
    Ok(Json(subscription.summary()))
}

/// GET /subscriptions/{subscriber_id}/{key_id}
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Path((subscriber_id, key_id)): Path<(String, String)>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscription = state.service.get(&subscriber_id, &key_id).await?;
    Ok(Json(subscription.summary()))
}
