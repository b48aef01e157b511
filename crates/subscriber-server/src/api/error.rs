//! API error types and responses
//!
//! The only place subscription errors are mapped to HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subscriber_core::SubscriptionError;
use thiserror::Error;
use tracing::{error, warn};

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
    pub message: String,
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation", "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", "NOT_FOUND"),
            ApiError::ProtocolViolation(_) => {
                (StatusCode::CONFLICT, "protocol", "PROTOCOL_VIOLATION")
            }
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict", "CONFLICT"),
            ApiError::Decryption(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "decryption", "DECRYPTION_FAILED")
            }
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.parts();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::ProtocolViolation(msg)
            | ApiError::Conflict(msg)
            | ApiError::Decryption(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = ErrorResponse {
            error: ErrorBody {
                error_type,
                code,
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Validation(msg) => ApiError::BadRequest(msg),
            SubscriptionError::ProtocolViolation { from, event } => {
                warn!(status = %from, event = %event, "Protocol violation");
                ApiError::ProtocolViolation(format!("{} not permitted from {}", event, from))
            }
            err @ SubscriptionError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            err @ SubscriptionError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            SubscriptionError::Decryption(msg) => ApiError::Decryption(msg),
            other => {
                error!(error = %other, "Internal error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}
