//! Payment Event Reducer
//!
//! Maps normalized payment-provider webhook events into plan record
//! mutations. The reducer is event-driven and idempotent by provider event
//! id; the evaluator is time-driven and idempotent by recomputation. Both
//! meet only at the plan record, which keeps them independent.
//!
//! Every mutation is an absolute assignment of the fields the event
//! carries, never an increment - applying the same event twice lands on the
//! same record.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use zaply_shared::types::PlanStatus;

use crate::error::{EntitlementError, EntitlementResult};
use crate::events::{PlanEventLogger, PlanEventType};
use crate::plan_store::PlanStore;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature before it is rejected (replay guard)
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Normalized payment provider event types Zaply reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventType {
    CheckoutCompleted,
    InvoicePaid,
    InvoicePaymentFailed,
    SubscriptionUpdated,
    SubscriptionCanceled,
}

impl std::fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentEventType::CheckoutCompleted => "checkout_completed",
            PaymentEventType::InvoicePaid => "invoice_paid",
            PaymentEventType::InvoicePaymentFailed => "invoice_payment_failed",
            PaymentEventType::SubscriptionUpdated => "subscription_updated",
            PaymentEventType::SubscriptionCanceled => "subscription_canceled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PaymentEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout_completed" => Ok(PaymentEventType::CheckoutCompleted),
            "invoice_paid" => Ok(PaymentEventType::InvoicePaid),
            "invoice_payment_failed" => Ok(PaymentEventType::InvoicePaymentFailed),
            "subscription_updated" => Ok(PaymentEventType::SubscriptionUpdated),
            "subscription_canceled" => Ok(PaymentEventType::SubscriptionCanceled),
            other => Err(other.to_string()),
        }
    }
}

/// A normalized payment provider event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider-side event id; the idempotency key
    pub provider_event_id: String,
    #[serde(rename = "type")]
    pub event_type: PaymentEventType,
    pub tenant_id: Uuid,
    pub subscription_id: Option<String>,
    /// Provider status string as sent; parsed leniently on apply
    pub status: Option<String>,
    /// Billing-period end, unix seconds on the wire
    #[serde(default, with = "time::serde::timestamp::option")]
    pub period_end: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub canceled_at: Option<OffsetDateTime>,
}

/// Wire shape of the webhook body; `type` arrives as a free-form string so
/// unknown event types can be acknowledged instead of failing deserialization.
#[derive(Debug, Deserialize)]
struct RawPaymentEvent {
    provider_event_id: String,
    #[serde(rename = "type")]
    event_type: String,
    tenant_id: Uuid,
    #[serde(default)]
    subscription_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, with = "time::serde::timestamp::option")]
    period_end: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::timestamp::option")]
    canceled_at: Option<OffsetDateTime>,
}

impl PaymentEvent {
    /// Parse a normalized webhook body.
    ///
    /// Malformed JSON surfaces as `InvalidEvent`; a well-formed event of an
    /// unknown type surfaces as `WebhookEventNotSupported` so the API layer
    /// can acknowledge it and stop provider retries.
    pub fn from_json(body: &[u8]) -> EntitlementResult<Self> {
        let raw: RawPaymentEvent = serde_json::from_slice(body)
            .map_err(|e| EntitlementError::InvalidEvent(format!("Malformed event body: {}", e)))?;

        let event_type = raw
            .event_type
            .parse::<PaymentEventType>()
            .map_err(EntitlementError::WebhookEventNotSupported)?;

        Ok(Self {
            provider_event_id: raw.provider_event_id,
            event_type,
            tenant_id: raw.tenant_id,
            subscription_id: raw.subscription_id,
            status: raw.status,
            period_end: raw.period_end,
            canceled_at: raw.canceled_at,
        })
    }
}

/// Whether an event changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    /// Plan record mutated
    Applied,
    /// Event id seen before; no mutation
    Duplicate,
}

/// Service applying normalized provider events to plan records
pub struct PaymentEventReducer {
    pool: PgPool,
    plans: PlanStore,
    events: PlanEventLogger,
}

impl PaymentEventReducer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            plans: PlanStore::new(pool.clone()),
            events: PlanEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Apply a normalized provider event to the tenant's plan record.
    ///
    /// The provider redelivers webhooks; the event id is checked up front
    /// and recorded only after the mutation lands, so a failed apply is
    /// redelivered and retried rather than silently swallowed. Concurrent
    /// redelivery can at worst apply the same absolute mutation twice.
    pub async fn apply(&self, event: &PaymentEvent) -> EntitlementResult<Applied> {
        if self.already_seen(&event.provider_event_id).await? {
            tracing::info!(
                provider_event_id = %event.provider_event_id,
                "Duplicate payment event, skipping"
            );
            return Ok(Applied::Duplicate);
        }

        self.reduce(event).await?;
        self.record(event).await?;

        self.events
            .log_with_provider_event(
                event.tenant_id,
                PlanEventType::PaymentEventApplied,
                serde_json::json!({ "event_type": event.event_type.to_string() }),
                Some(&event.provider_event_id),
            )
            .await;

        tracing::info!(
            tenant_id = %event.tenant_id,
            provider_event_id = %event.provider_event_id,
            event_type = %event.event_type,
            "Applied payment event"
        );

        Ok(Applied::Applied)
    }

    async fn already_seen(&self, provider_event_id: &str) -> EntitlementResult<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT provider_event_id FROM payment_events WHERE provider_event_id = $1",
        )
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn record(&self, event: &PaymentEvent) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (provider_event_id, tenant_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(&event.provider_event_id)
        .bind(event.tenant_id)
        .bind(event.event_type.to_string())
        .bind(serde_json::to_value(event).unwrap_or_else(|_| serde_json::json!({})))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reduce(&self, event: &PaymentEvent) -> EntitlementResult<()> {
        match event.event_type {
            PaymentEventType::CheckoutCompleted => {
                let subscription_id = event.subscription_id.as_deref().ok_or_else(|| {
                    EntitlementError::InvalidEvent(
                        "checkout_completed without subscription_id".to_string(),
                    )
                })?;
                let period_end = event.period_end.ok_or_else(|| {
                    EntitlementError::InvalidEvent(
                        "checkout_completed without period_end".to_string(),
                    )
                })?;
                self.plans
                    .activate_paid(event.tenant_id, subscription_id, period_end)
                    .await
            }
            PaymentEventType::InvoicePaid => {
                let period_end = event.period_end.ok_or_else(|| {
                    EntitlementError::InvalidEvent("invoice_paid without period_end".to_string())
                })?;
                self.plans.renew(event.tenant_id, period_end).await
            }
            PaymentEventType::InvoicePaymentFailed => {
                self.plans
                    .set_status(event.tenant_id, PlanStatus::PastDue)
                    .await
            }
            PaymentEventType::SubscriptionCanceled => {
                self.plans
                    .set_status(event.tenant_id, PlanStatus::Canceled)
                    .await
            }
            PaymentEventType::SubscriptionUpdated => {
                let status = match event.status.as_deref() {
                    Some(s) => Some(
                        s.parse::<PlanStatus>()
                            .map_err(EntitlementError::InvalidEvent)?,
                    ),
                    None => None,
                };
                self.plans
                    .update_from_provider(event.tenant_id, status, event.period_end)
                    .await
            }
        }
    }
}

/// Verify the webhook signature header (`t=<unix>,v1=<hex>`) over the raw
/// request body.
///
/// The signed message is `"{timestamp}.{payload}"` under HMAC-SHA256 with
/// the shared webhook secret; the comparison is constant-time. Signatures
/// older than the tolerance window are rejected to block replays. The
/// current instant is a parameter, never read here.
pub fn verify_signature(
    secret: &str,
    signature_header: &str,
    payload: &[u8],
    now: OffsetDateTime,
) -> EntitlementResult<()> {
    let mut timestamp: Option<&str> = None;
    let mut signature: Option<&str> = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signature = Some(v),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(EntitlementError::WebhookSignatureInvalid),
    };

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| EntitlementError::WebhookSignatureInvalid)?;
    if (now.unix_timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(EntitlementError::WebhookSignatureInvalid);
    }

    let expected = hex::decode(signature).map_err(|_| EntitlementError::WebhookSignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EntitlementError::WebhookSignatureInvalid)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| EntitlementError::WebhookSignatureInvalid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_signature_roundtrip() {
        let secret = "whsec_test_secret_at_least_32_chars!";
        let payload = br#"{"provider_event_id":"evt_1"}"#;
        let header = sign(secret, now().unix_timestamp(), payload);
        assert!(verify_signature(secret, &header, payload, now()).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampered_payload() {
        let secret = "whsec_test_secret_at_least_32_chars!";
        let header = sign(secret, now().unix_timestamp(), b"original");
        let result = verify_signature(secret, &header, b"tampered", now());
        assert!(matches!(
            result,
            Err(EntitlementError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_signature_rejects_wrong_secret() {
        let header = sign("whsec_first_secret_at_least_32_ch!", now().unix_timestamp(), b"x");
        let result = verify_signature("whsec_other_secret_at_least_32_ch!", &header, b"x", now());
        assert!(matches!(
            result,
            Err(EntitlementError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let secret = "whsec_test_secret_at_least_32_chars!";
        let stale = now().unix_timestamp() - SIGNATURE_TOLERANCE_SECS - 1;
        let header = sign(secret, stale, b"payload");
        let result = verify_signature(secret, &header, b"payload", now());
        assert!(matches!(
            result,
            Err(EntitlementError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_signature_rejects_malformed_header() {
        let secret = "whsec_test_secret_at_least_32_chars!";
        for header in ["", "t=123", "v1=abcd", "t=,v1=", "nonsense"] {
            assert!(
                verify_signature(secret, header, b"payload", now()).is_err(),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn test_parse_normalized_event() {
        let body = br#"{
            "provider_event_id": "evt_42",
            "type": "invoice_paid",
            "tenant_id": "9f3c6a1e-8a6f-4f6e-9a7b-0c1d2e3f4a5b",
            "subscription_id": "sub_99",
            "status": "active",
            "period_end": 1702592000
        }"#;
        let event = PaymentEvent::from_json(body).unwrap();
        assert_eq!(event.event_type, PaymentEventType::InvoicePaid);
        assert_eq!(event.subscription_id.as_deref(), Some("sub_99"));
        assert_eq!(
            event.period_end.unwrap().unix_timestamp(),
            1_702_592_000
        );
        assert!(event.canceled_at.is_none());
    }

    #[test]
    fn test_parse_unknown_event_type_is_not_supported() {
        let body = br#"{
            "provider_event_id": "evt_43",
            "type": "customer.plaid_linked",
            "tenant_id": "9f3c6a1e-8a6f-4f6e-9a7b-0c1d2e3f4a5b"
        }"#;
        let result = PaymentEvent::from_json(body);
        assert!(matches!(
            result,
            Err(EntitlementError::WebhookEventNotSupported(t)) if t == "customer.plaid_linked"
        ));
    }

    #[test]
    fn test_parse_malformed_body_is_invalid_event() {
        let result = PaymentEvent::from_json(b"not json");
        assert!(matches!(result, Err(EntitlementError::InvalidEvent(_))));
    }

    #[test]
    fn test_event_type_display_roundtrip() {
        for event_type in [
            PaymentEventType::CheckoutCompleted,
            PaymentEventType::InvoicePaid,
            PaymentEventType::InvoicePaymentFailed,
            PaymentEventType::SubscriptionUpdated,
            PaymentEventType::SubscriptionCanceled,
        ] {
            let parsed: PaymentEventType = event_type.to_string().parse().unwrap();
            assert_eq!(parsed, event_type);
        }
    }
}
