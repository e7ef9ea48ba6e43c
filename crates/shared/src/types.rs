//! Common types used across Zaply

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Provider-reported plan status.
///
/// This is authoritative for what the payment provider believes about the
/// subscription, independent of any time-derived expiry the evaluator computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    PastDue,
    Canceled,
    Trial,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Active => write!(f, "active"),
            PlanStatus::PastDue => write!(f, "past_due"),
            PlanStatus::Canceled => write!(f, "canceled"),
            PlanStatus::Trial => write!(f, "trial"),
        }
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;

    /// Parse a provider status string. Providers are not consistent about
    /// spelling, so a few aliases are folded into the canonical variants.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(PlanStatus::Active),
            "past_due" => Ok(PlanStatus::PastDue),
            "canceled" | "cancelled" | "unpaid" => Ok(PlanStatus::Canceled),
            "trial" | "trialing" => Ok(PlanStatus::Trial),
            other => Err(format!("unknown plan status: {}", other)),
        }
    }
}

/// Lifecycle of one WhatsApp gateway pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// QR pairing in progress; the gateway already holds a live socket.
    Pairing,
    Connected,
    Disconnected,
}

impl SessionStatus {
    /// Whether the gateway side of this session may still be alive.
    /// Teardown only acts on live sessions; disconnected rows are skipped.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Pairing | SessionStatus::Connected)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pairing => write!(f, "pairing"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One per-tenant subscription record.
///
/// Written by the payment event reducer and the checkout flow; the
/// entitlement evaluator only ever reads it. `trial_expires_at` set means
/// the record is a trial record regardless of `expires_at` (trial takes
/// precedence when both are populated).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanRecord {
    pub tenant_id: Uuid,
    pub trial_expires_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
    pub status: PlanStatus,
    pub subscription_id: Option<String>,
    pub updated_at: OffsetDateTime,
}

/// One WhatsApp gateway pairing belonging to a tenant.
///
/// `session_token` is the per-session gateway credential; gateway calls for
/// this session must use this token and no other.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaSession {
    pub tenant_id: Uuid,
    pub session_key: String,
    pub session_token: String,
    pub status: SessionStatus,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_status_display_roundtrip() {
        for status in [
            PlanStatus::Active,
            PlanStatus::PastDue,
            PlanStatus::Canceled,
            PlanStatus::Trial,
        ] {
            let parsed: PlanStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_plan_status_provider_aliases() {
        assert_eq!("trialing".parse::<PlanStatus>().unwrap(), PlanStatus::Trial);
        assert_eq!(
            "unpaid".parse::<PlanStatus>().unwrap(),
            PlanStatus::Canceled
        );
        assert_eq!(
            "cancelled".parse::<PlanStatus>().unwrap(),
            PlanStatus::Canceled
        );
        assert!("gold".parse::<PlanStatus>().is_err());
    }

    #[test]
    fn test_session_liveness() {
        assert!(SessionStatus::Pairing.is_live());
        assert!(SessionStatus::Connected.is_live());
        assert!(!SessionStatus::Disconnected.is_live());
    }
}
