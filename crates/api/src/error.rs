//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use zaply_entitlement::error::EntitlementError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid webhook signature")]
    InvalidSignature,

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Entitlement state could not be computed. Clients must treat this as
    // "unknown", never as "expired": no expiry UI, no feature gating.
    #[error("Entitlement state unavailable")]
    EntitlementUnavailable,

    // Internal errors
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "INVALID_SIGNATURE",
                self.to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::EntitlementUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ENTITLEMENT_UNAVAILABLE",
                "Entitlement state is temporarily unknown. Retry shortly; do not treat as expired."
                    .to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Access(msg) => {
                tracing::error!(error = %msg, "Store access failed");
                ApiError::EntitlementUnavailable
            }
            EntitlementError::WebhookSignatureInvalid => ApiError::InvalidSignature,
            EntitlementError::WebhookEventNotSupported(event_type) => {
                // Handlers acknowledge these before conversion; reaching
                // here means a caller forgot to, so reject visibly.
                ApiError::BadRequest(format!("Unsupported event type: {}", event_type))
            }
            EntitlementError::InvalidEvent(msg) => ApiError::BadRequest(msg),
            EntitlementError::NotFound(_) => ApiError::NotFound,
            EntitlementError::Gateway(msg) => {
                tracing::error!(error = %msg, "Gateway error reached API boundary");
                ApiError::Internal
            }
            EntitlementError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
