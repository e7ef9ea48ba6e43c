//! Entitlement error types

use thiserror::Error;

/// Entitlement-specific errors
#[derive(Debug, Error)]
pub enum EntitlementError {
    /// Plan or session store unreachable/denied. Distinct from "no record":
    /// callers must never treat an unknown state as expired.
    #[error("Store access failed: {0}")]
    Access(String),

    #[error("Gateway call failed: {0}")]
    Gateway(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook event type not supported: {0}")]
    WebhookEventNotSupported(String),

    #[error("Invalid payment event: {0}")]
    InvalidEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for EntitlementError {
    fn from(err: sqlx::Error) -> Self {
        EntitlementError::Access(err.to_string())
    }
}

impl From<reqwest::Error> for EntitlementError {
    fn from(err: reqwest::Error) -> Self {
        EntitlementError::Gateway(err.to_string())
    }
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;
