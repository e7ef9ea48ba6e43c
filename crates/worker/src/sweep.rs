//! Entitlement sweep and maintenance jobs

use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use zaply_entitlement::orchestrator::EntitlementService;
use zaply_entitlement::plan_store::PlanStore;

/// Reconcile lapsed plans with live WhatsApp sessions.
///
/// Each candidate tenant goes through the same `check_and_enforce` path the
/// API uses, so the sweep cannot diverge from request-time enforcement.
/// Per-tenant failures are logged and the sweep continues.
pub async fn run_entitlement_sweep(pool: &PgPool, entitlement: &EntitlementService) {
    let plans = PlanStore::new(pool.clone());
    let now = OffsetDateTime::now_utc();

    let tenants = match plans.lapsed_tenant_ids(now).await {
        Ok(tenants) => tenants,
        Err(e) => {
            error!(error = %e, "Failed to list lapsed tenants");
            return;
        }
    };

    if tenants.is_empty() {
        return; // No work to do
    }

    info!(count = tenants.len(), "Entitlement sweep: checking lapsed tenants");

    let mut expired = 0usize;
    let mut failures = 0usize;
    for tenant_id in &tenants {
        match entitlement.check_and_enforce(*tenant_id).await {
            Ok(state) => {
                if state.is_expired {
                    expired += 1;
                }
            }
            Err(e) => {
                failures += 1;
                warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Sweep check failed, continuing"
                );
            }
        }
    }

    info!(
        checked = tenants.len(),
        expired = expired,
        failures = failures,
        "Entitlement sweep completed"
    );
}

/// Cleanup old processed payment events (for maintenance job)
pub async fn cleanup_old_payment_events(pool: &PgPool, retention_days: i32) {
    let result = sqlx::query(
        r#"
        DELETE FROM payment_events
        WHERE received_at < NOW() - ($1 || ' days')::INTERVAL
        "#,
    )
    .bind(retention_days)
    .execute(pool)
    .await;

    match result {
        Ok(rows) => {
            if rows.rows_affected() > 0 {
                info!(
                    deleted = rows.rows_affected(),
                    retention_days = retention_days,
                    "Cleaned up old payment events"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to cleanup old payment events");
        }
    }
}
