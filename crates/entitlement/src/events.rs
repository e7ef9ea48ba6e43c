//! Plan Audit Events
//!
//! Append-only log of plan lifecycle changes. Answers "why did this
//! tenant's WhatsApp sessions disconnect?" and "which provider event put
//! the plan in this state?" without reconstructing it from provider logs.
//!
//! Logging is best-effort: a failed audit insert is reported via tracing
//! and never propagated, so audit trouble cannot block enforcement or
//! webhook processing.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::EntitlementResult;

/// Types of plan lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanEventType {
    /// A normalized payment provider event mutated the plan record.
    PaymentEventApplied,
    /// Entitlement lapsed and every live session was disconnected.
    TeardownEnforced,
    /// Entitlement lapsed but one or more sessions failed to disconnect;
    /// the next evaluation retries them.
    TeardownPartialFailure,
}

impl std::fmt::Display for PlanEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanEventType::PaymentEventApplied => "PAYMENT_EVENT_APPLIED",
            PlanEventType::TeardownEnforced => "TEARDOWN_ENFORCED",
            PlanEventType::TeardownPartialFailure => "TEARDOWN_PARTIAL_FAILURE",
        };
        write!(f, "{}", s)
    }
}

/// A plan audit event record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub provider_event_id: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Service for appending and querying plan audit events
pub struct PlanEventLogger {
    pool: PgPool,
}

impl PlanEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event. Best-effort: failures are logged, never returned.
    pub async fn log(
        &self,
        tenant_id: Uuid,
        event_type: PlanEventType,
        event_data: serde_json::Value,
    ) {
        self.log_with_provider_event(tenant_id, event_type, event_data, None)
            .await;
    }

    /// Append an event correlated to a payment provider event id.
    pub async fn log_with_provider_event(
        &self,
        tenant_id: Uuid,
        event_type: PlanEventType,
        event_data: serde_json::Value,
        provider_event_id: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO plan_events (tenant_id, event_type, event_data, provider_event_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tenant_id)
        .bind(event_type.to_string())
        .bind(&event_data)
        .bind(provider_event_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                tenant_id = %tenant_id,
                event_type = %event_type,
                error = %e,
                "Failed to append plan event"
            );
        }
    }

    /// Recent events for a tenant, newest first.
    pub async fn recent_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> EntitlementResult<Vec<PlanEvent>> {
        let events: Vec<PlanEvent> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, event_type, event_data, provider_event_id, created_at
            FROM plan_events
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_event_type_display() {
        assert_eq!(
            PlanEventType::PaymentEventApplied.to_string(),
            "PAYMENT_EVENT_APPLIED"
        );
        assert_eq!(
            PlanEventType::TeardownEnforced.to_string(),
            "TEARDOWN_ENFORCED"
        );
        assert_eq!(
            PlanEventType::TeardownPartialFailure.to_string(),
            "TEARDOWN_PARTIAL_FAILURE"
        );
    }
}
