//! Subscription intake handlers
//!
//! `POST /subscribe` records a new registration intent; `PATCH /subscribe`
//! re-registers a subscription the registry rejected. Both answer as soon as
//! the intent is stored and call the registry in the background.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use subscriber_core::{RegistrationPayload, SubscriptionSummary};

use super::AppState;
use crate::api::error::ApiError;
use crate::api::json::ApiJson;

/// Body of `POST /subscribe` and `PATCH /subscribe`
#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    pub subscriber_id: String,
    pub key_id: String,

    #[serde(rename = "type")]
    pub subscriber_type: String,

    #[serde(flatten)]
    pub payload: RegistrationPayload,
}

/// Create a subscription
///
/// POST /subscribe
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SubscribeBody>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscription = state
        .service
        .create(&body.subscriber_id, &body.key_id, &body.subscriber_type, body.payload)
        .await?;
    Ok(Json(subscription.summary()))
}

/// Re-register a subscription after `INVALID` or `INVALID_SSL`
///
/// PATCH /subscribe
pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<SubscribeBody>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscription = state
        .service
        .update(&body.subscriber_id, &body.key_id, &body.subscriber_type, body.payload)
        .await?;
    Ok(Json(subscription.summary()))
}
