//! Payment provider webhook endpoint

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::json;
use time::OffsetDateTime;

use zaply_entitlement::error::EntitlementError;
use zaply_entitlement::payment_events::{verify_signature, Applied, PaymentEvent};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "zaply-signature";

/// Handle payment provider webhook events
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    tracing::info!(body_len = body.len(), "Payment webhook received");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Payment webhook missing signature header");
            ApiError::BadRequest("Missing signature header".to_string())
        })?;

    verify_signature(
        &state.config.payment_webhook_secret,
        signature,
        &body,
        OffsetDateTime::now_utc(),
    )
    .map_err(|e| {
        tracing::warn!(error = ?e, "Payment webhook signature verification failed");
        ApiError::InvalidSignature
    })?;

    let event = match PaymentEvent::from_json(&body) {
        Ok(event) => event,
        // Acknowledge unknown event types so the provider stops retrying
        Err(EntitlementError::WebhookEventNotSupported(event_type)) => {
            tracing::info!(event_type = %event_type, "Ignoring unsupported payment event");
            return Ok(Json(json!({ "received": true, "applied": false })));
        }
        Err(e) => return Err(e.into()),
    };

    let applied = state.reducer.apply(&event).await?;

    tracing::info!(
        provider_event_id = %event.provider_event_id,
        applied = ?applied,
        "Payment webhook processed"
    );

    Ok(Json(json!({
        "received": true,
        "applied": applied == Applied::Applied,
    })))
}
