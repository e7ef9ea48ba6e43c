//! Entitlement Orchestrator
//!
//! Wires the pure evaluator to its one side effect: session teardown on
//! loss of entitlement. Every caller - dashboard poll, payment webhook,
//! worker sweep - goes through [`EntitlementService::check_and_enforce`].
//!
//! The answer is always re-derived from the plan record and the current
//! instant; no "teardown already done" flag is persisted. Concurrent or
//! repeated calls are therefore safe without locking: the worst case is a
//! redundant gateway logout, which the gateway tolerates as a no-op.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::EntitlementResult;
use crate::evaluate::{evaluate, Entitlement};
use crate::events::{PlanEventLogger, PlanEventType};
use crate::gateway::GatewayClient;
use crate::plan_store::PlanStore;
use crate::teardown::TeardownService;

/// Entitlement service for evaluating and enforcing plan state
pub struct EntitlementService {
    plans: PlanStore,
    teardown: TeardownService,
    events: PlanEventLogger,
}

impl EntitlementService {
    pub fn new(pool: PgPool, gateway: GatewayClient) -> Self {
        Self {
            plans: PlanStore::new(pool.clone()),
            teardown: TeardownService::new(pool.clone(), gateway),
            events: PlanEventLogger::new(pool),
        }
    }

    /// Evaluate a tenant's entitlement and enforce teardown if it lapsed.
    ///
    /// A plan store failure propagates before evaluation runs: an unknown
    /// state must never read as "expired", and no teardown fires on a
    /// transient read error. A teardown failure is logged and does not fail
    /// the call - the entitlement answer is still returned so UI gating
    /// never hangs on a best-effort side effect.
    pub async fn check_and_enforce(&self, tenant_id: Uuid) -> EntitlementResult<Entitlement> {
        let plan = self.plans.get(tenant_id).await?;
        let entitlement = evaluate(plan.as_ref(), OffsetDateTime::now_utc());

        if entitlement.requires_teardown {
            self.enforce(tenant_id).await;
        }

        Ok(entitlement)
    }

    /// Read-only evaluation for callers that must not enforce
    /// (e.g. a billing preview).
    pub async fn entitlement(&self, tenant_id: Uuid) -> EntitlementResult<Entitlement> {
        let plan = self.plans.get(tenant_id).await?;
        Ok(evaluate(plan.as_ref(), OffsetDateTime::now_utc()))
    }

    /// Run teardown for a tenant and record the outcome. Failures stay
    /// local to this method.
    async fn enforce(&self, tenant_id: Uuid) {
        let results = match self.teardown.disconnect_all_sessions(tenant_id).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Teardown failed; entitlement answer unaffected"
                );
                return;
            }
        };

        if results.is_empty() {
            // Nothing live - a previous run already finished the job.
            return;
        }

        let failed = results.iter().filter(|r| !r.success).count();
        if failed == 0 {
            tracing::info!(
                tenant_id = %tenant_id,
                count = results.len(),
                "Tore down sessions after entitlement lapse"
            );
            self.events
                .log(
                    tenant_id,
                    PlanEventType::TeardownEnforced,
                    serde_json::json!({ "disconnected": results.len() }),
                )
                .await;
        } else {
            tracing::warn!(
                tenant_id = %tenant_id,
                failed = failed,
                total = results.len(),
                "Teardown partially failed; next evaluation retries"
            );
            self.events
                .log(
                    tenant_id,
                    PlanEventType::TeardownPartialFailure,
                    serde_json::json!({
                        "failed": failed,
                        "total": results.len(),
                    }),
                )
                .await;
        }
    }
}
