//! Entitlement Evaluator
//!
//! Answers the question: "may this tenant use paid features right now, and
//! must its WhatsApp sessions come down?"
//!
//! ## Design Principles
//!
//! 1. **Pure**: `evaluate()` never reads the clock or the database; the
//!    instant is always a parameter
//! 2. **Deterministic**: same plan record + same instant, same answer
//! 3. **Total**: every well-typed input produces a state, never an error
//! 4. **One state machine per plan kind**: trial and paid plans follow
//!    different expiry policies and are evaluated by separate strategies
//!    that happen to share a result shape

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use zaply_shared::types::{PlanRecord, PlanStatus};

/// Days of continued access after a paid billing period lapses.
/// Paid customers get a remediation window; trials cut off hard.
pub const GRACE_PERIOD_DAYS: i64 = 3;

const SECONDS_PER_DAY: i64 = 86_400;

/// What kind of plan a record represents.
///
/// Classification is the only place the trial/paid precedence rule lives:
/// a record with `trial_expires_at` set is a trial record even if
/// `expires_at` happens to be populated too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// No plan record at all. The tenant has not finished setup - this is
    /// not "expired" and must never trigger teardown.
    Unconfigured,
    /// Time-boxed free access with a hard cutoff, no grace.
    Trial {
        expires_at: OffsetDateTime,
        status: PlanStatus,
    },
    /// Paid plan with a grace window past the billing-period end.
    Paid {
        expires_at: OffsetDateTime,
        status: PlanStatus,
    },
    /// Neither timestamp set; only the provider status carries meaning.
    Bare { status: PlanStatus },
}

impl PlanKind {
    pub fn classify(plan: Option<&PlanRecord>) -> Self {
        match plan {
            None => PlanKind::Unconfigured,
            Some(p) => {
                if let Some(expires_at) = p.trial_expires_at {
                    PlanKind::Trial {
                        expires_at,
                        status: p.status,
                    }
                } else if let Some(expires_at) = p.expires_at {
                    PlanKind::Paid {
                        expires_at,
                        status: p.status,
                    }
                } else {
                    PlanKind::Bare { status: p.status }
                }
            }
        }
    }
}

/// Derived entitlement state. Recomputed on every evaluation, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Tenant may use paid/trial features now.
    pub is_active: bool,
    /// Hard-expired: feature access is blocked.
    pub is_expired: bool,
    /// Paid plan past `expires_at` but still within the grace window.
    pub is_in_grace_period: bool,
    /// Whole days of grace left; 0 outside the grace window.
    pub grace_days_remaining: i64,
    /// Whole days until trial/paid expiry, floored at 0.
    pub days_remaining: i64,
    pub is_paid_plan: bool,
    /// The enforcement half of the verdict: live sessions must come down.
    /// Re-derived on every call, so acting on it repeatedly must stay safe.
    pub requires_teardown: bool,
    /// The instant this state was computed against.
    pub computed_at: OffsetDateTime,
}

impl Entitlement {
    fn unconfigured(now: OffsetDateTime) -> Self {
        Self {
            is_active: false,
            is_expired: false,
            is_in_grace_period: false,
            grace_days_remaining: 0,
            days_remaining: 0,
            is_paid_plan: false,
            requires_teardown: false,
            computed_at: now,
        }
    }
}

/// Compute the entitlement state for a plan record at a given instant.
///
/// This is THE function that decides entitlement; every caller (dashboard
/// poll, payment webhook, worker sweep) sees the same rules because they
/// all go through here.
pub fn evaluate(plan: Option<&PlanRecord>, now: OffsetDateTime) -> Entitlement {
    match PlanKind::classify(plan) {
        PlanKind::Unconfigured => Entitlement::unconfigured(now),
        PlanKind::Trial { expires_at, status } => evaluate_trial(expires_at, status, now),
        PlanKind::Paid { expires_at, status } => evaluate_paid(expires_at, status, now),
        PlanKind::Bare { status } => evaluate_bare(status, now),
    }
}

/// Whole days from `from` until `until`, rounded up, floored at 0.
fn ceil_days(from: OffsetDateTime, until: OffsetDateTime) -> i64 {
    let seconds = (until - from).whole_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// Trial policy: hard cutoff at `expires_at`, no grace.
/// The boundary instant itself is still active (strict `>` comparison).
fn evaluate_trial(expires_at: OffsetDateTime, status: PlanStatus, now: OffsetDateTime) -> Entitlement {
    let is_expired = now > expires_at;
    Entitlement {
        is_active: !is_expired && matches!(status, PlanStatus::Active | PlanStatus::Trial),
        is_expired,
        is_in_grace_period: false,
        grace_days_remaining: 0,
        days_remaining: ceil_days(now, expires_at),
        is_paid_plan: false,
        requires_teardown: is_expired,
        computed_at: now,
    }
}

/// Paid policy: access runs through `expires_at` plus the grace window.
/// A provider-reported cancellation expires the plan regardless of dates.
fn evaluate_paid(expires_at: OffsetDateTime, status: PlanStatus, now: OffsetDateTime) -> Entitlement {
    let grace_end = expires_at + Duration::days(GRACE_PERIOD_DAYS);
    let expired_now = now > expires_at;
    let expired_past_grace = now > grace_end;
    let canceled = status == PlanStatus::Canceled;

    Entitlement {
        is_active: status == PlanStatus::Active && !expired_past_grace,
        is_expired: expired_past_grace || canceled,
        is_in_grace_period: expired_now && !expired_past_grace,
        grace_days_remaining: if expired_now {
            ceil_days(now, grace_end)
        } else {
            0
        },
        days_remaining: ceil_days(now, expires_at),
        is_paid_plan: true,
        requires_teardown: expired_past_grace || canceled,
        computed_at: now,
    }
}

/// No expiry instant at all: the provider status is the whole story.
/// These records never trigger teardown - enforcement for manually
/// provisioned accounts is an operator action, not an automatic one.
fn evaluate_bare(status: PlanStatus, now: OffsetDateTime) -> Entitlement {
    let is_active = status == PlanStatus::Active;
    Entitlement {
        is_active,
        is_expired: !is_active,
        is_in_grace_period: false,
        grace_days_remaining: 0,
        days_remaining: 0,
        is_paid_plan: false,
        requires_teardown: false,
        computed_at: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn trial_plan(expires_at: OffsetDateTime, status: PlanStatus) -> PlanRecord {
        PlanRecord {
            tenant_id: Uuid::new_v4(),
            trial_expires_at: Some(expires_at),
            expires_at: None,
            status,
            subscription_id: None,
            updated_at: now(),
        }
    }

    fn paid_plan(expires_at: OffsetDateTime, status: PlanStatus) -> PlanRecord {
        PlanRecord {
            tenant_id: Uuid::new_v4(),
            trial_expires_at: None,
            expires_at: Some(expires_at),
            status,
            subscription_id: Some("sub_test_123".to_string()),
            updated_at: now(),
        }
    }

    fn bare_plan(status: PlanStatus) -> PlanRecord {
        PlanRecord {
            tenant_id: Uuid::new_v4(),
            trial_expires_at: None,
            expires_at: None,
            status,
            subscription_id: None,
            updated_at: now(),
        }
    }

    #[test]
    fn test_null_plan_is_unconfigured_not_expired() {
        let state = evaluate(None, now());
        assert!(!state.is_active);
        assert!(!state.is_expired);
        assert!(!state.requires_teardown);
        assert_eq!(state.days_remaining, 0);
        assert_eq!(state.grace_days_remaining, 0);
    }

    #[test]
    fn test_trial_in_future_is_active() {
        let plan = trial_plan(now() + Duration::days(2), PlanStatus::Trial);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_active);
        assert!(!state.is_expired);
        assert!(!state.is_paid_plan);
        assert_eq!(state.days_remaining, 2);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_trial_boundary_instant_still_active() {
        // Strict `>` comparison: expiry exactly at `now` is not yet expired.
        let plan = trial_plan(now(), PlanStatus::Trial);
        let state = evaluate(Some(&plan), now());
        assert!(!state.is_expired);
        assert!(!state.requires_teardown);
        assert_eq!(state.days_remaining, 0);
    }

    #[test]
    fn test_trial_one_second_past_expiry_tears_down() {
        let plan = trial_plan(now() - Duration::seconds(1), PlanStatus::Trial);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_expired);
        assert!(!state.is_active);
        assert!(state.requires_teardown);
        assert!(!state.is_in_grace_period); // trials get no grace
    }

    #[test]
    fn test_trial_canceled_status_is_inactive_while_unexpired() {
        let plan = trial_plan(now() + Duration::days(5), PlanStatus::Canceled);
        let state = evaluate(Some(&plan), now());
        assert!(!state.is_active);
        assert!(!state.is_expired);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_paid_one_day_past_expiry_is_in_grace() {
        let plan = paid_plan(now() - Duration::days(1), PlanStatus::Active);
        let state = evaluate(Some(&plan), now());
        assert!(!state.is_expired);
        assert!(state.is_in_grace_period);
        assert_eq!(state.grace_days_remaining, 2);
        assert_eq!(state.days_remaining, 0);
        assert!(state.is_active);
        assert!(state.is_paid_plan);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_paid_four_days_past_expiry_is_hard_expired() {
        let plan = paid_plan(now() - Duration::days(4), PlanStatus::Active);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_expired);
        assert!(!state.is_in_grace_period);
        assert!(!state.is_active);
        assert!(state.requires_teardown);
        assert_eq!(state.grace_days_remaining, 0);
    }

    #[test]
    fn test_paid_ten_days_past_expiry_tears_down() {
        let plan = paid_plan(now() - Duration::days(10), PlanStatus::Active);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_expired);
        assert!(!state.is_in_grace_period);
        assert!(state.requires_teardown);
    }

    #[test]
    fn test_paid_future_expiry_is_active() {
        let plan = paid_plan(now() + Duration::days(20), PlanStatus::Active);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_active);
        assert!(!state.is_expired);
        assert!(!state.is_in_grace_period);
        assert_eq!(state.days_remaining, 20);
        assert_eq!(state.grace_days_remaining, 0);
    }

    #[test]
    fn test_paid_canceled_with_future_expiry_is_expired() {
        // Literal rule: a provider-reported cancellation expires the plan
        // and tears sessions down even while the paid period runs.
        let plan = paid_plan(now() + Duration::days(10), PlanStatus::Canceled);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_expired);
        assert!(!state.is_active);
        assert!(state.requires_teardown);
        assert!(!state.is_in_grace_period);
    }

    #[test]
    fn test_paid_past_due_in_grace_is_not_active() {
        let plan = paid_plan(now() - Duration::days(1), PlanStatus::PastDue);
        let state = evaluate(Some(&plan), now());
        assert!(!state.is_active);
        assert!(!state.is_expired);
        assert!(state.is_in_grace_period);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_grace_boundary_instant_still_in_grace() {
        let plan = paid_plan(now() - Duration::days(GRACE_PERIOD_DAYS), PlanStatus::Active);
        let state = evaluate(Some(&plan), now());
        assert!(state.is_in_grace_period);
        assert!(!state.is_expired);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_bare_active_record() {
        let state = evaluate(Some(&bare_plan(PlanStatus::Active)), now());
        assert!(state.is_active);
        assert!(!state.is_expired);
        assert!(!state.requires_teardown);
        assert_eq!(state.days_remaining, 0);
    }

    #[test]
    fn test_bare_inactive_record_never_tears_down() {
        // Expired without an expiry instant, but enforcement stays manual.
        let state = evaluate(Some(&bare_plan(PlanStatus::Canceled)), now());
        assert!(!state.is_active);
        assert!(state.is_expired);
        assert!(!state.requires_teardown);
    }

    #[test]
    fn test_trial_takes_precedence_when_both_timestamps_set() {
        let mut plan = trial_plan(now() + Duration::days(2), PlanStatus::Trial);
        plan.expires_at = Some(now() + Duration::days(30));
        let state = evaluate(Some(&plan), now());
        assert!(!state.is_paid_plan);
        assert_eq!(state.days_remaining, 2);
        assert!(matches!(
            PlanKind::classify(Some(&plan)),
            PlanKind::Trial { .. }
        ));
    }

    #[test]
    fn test_ceil_days_rounds_partial_days_up() {
        assert_eq!(ceil_days(now(), now() + Duration::hours(1)), 1);
        assert_eq!(ceil_days(now(), now() + Duration::hours(25)), 2);
        assert_eq!(ceil_days(now(), now() + Duration::days(2)), 2);
        assert_eq!(ceil_days(now(), now()), 0);
        assert_eq!(ceil_days(now(), now() - Duration::days(1)), 0);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let plan = paid_plan(now() - Duration::days(1), PlanStatus::Active);
        let first = evaluate(Some(&plan), now());
        let second = evaluate(Some(&plan), now());
        assert_eq!(first, second);
    }
}
