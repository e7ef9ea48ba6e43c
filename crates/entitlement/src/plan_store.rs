//! Plan record access
//!
//! Single read/write surface over `plan_records`. The evaluator reads
//! through [`PlanStore::get`]; the write helpers are used by the payment
//! event reducer and the signup/checkout flows. Derived entitlement state
//! is never written back - only the provider mutates `status`.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use zaply_shared::types::{PlanRecord, PlanStatus};

use crate::error::EntitlementResult;
use crate::evaluate::GRACE_PERIOD_DAYS;

pub struct PlanStore {
    pool: PgPool,
}

impl PlanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a tenant's plan record.
    ///
    /// `Ok(None)` means the tenant has no plan yet (unconfigured) - distinct
    /// from `Err(Access)` when the store is unreachable. Callers must not
    /// collapse the two: a transient read failure is not "no plan".
    pub async fn get(&self, tenant_id: Uuid) -> EntitlementResult<Option<PlanRecord>> {
        let record: Option<PlanRecord> = sqlx::query_as(
            r#"
            SELECT tenant_id, trial_expires_at, expires_at, status, subscription_id, updated_at
            FROM plan_records
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Start (or restart) a trial for a tenant at signup.
    pub async fn start_trial(
        &self,
        tenant_id: Uuid,
        trial_expires_at: OffsetDateTime,
    ) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO plan_records (tenant_id, trial_expires_at, status, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (tenant_id) DO UPDATE
            SET trial_expires_at = EXCLUDED.trial_expires_at,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(trial_expires_at)
        .bind(PlanStatus::Trial)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Activate a paid plan from a completed checkout.
    /// Clears any trial window: the provider is authoritative from here on.
    pub async fn activate_paid(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
        period_end: OffsetDateTime,
    ) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO plan_records (tenant_id, trial_expires_at, expires_at, status, subscription_id, updated_at)
            VALUES ($1, NULL, $2, $3, $4, NOW())
            ON CONFLICT (tenant_id) DO UPDATE
            SET trial_expires_at = NULL,
                expires_at = EXCLUDED.expires_at,
                status = EXCLUDED.status,
                subscription_id = EXCLUDED.subscription_id,
                updated_at = NOW()
            "#,
        )
        .bind(tenant_id)
        .bind(period_end)
        .bind(PlanStatus::Active)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Advance the billing period end and restore active standing
    /// (invoice paid / subscription renewed).
    pub async fn renew(&self, tenant_id: Uuid, period_end: OffsetDateTime) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            UPDATE plan_records
            SET expires_at = $2, status = $3, updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(period_end)
        .bind(PlanStatus::Active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set the provider-reported status without touching the period end.
    pub async fn set_status(&self, tenant_id: Uuid, status: PlanStatus) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            UPDATE plan_records
            SET status = $2, updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply a provider-side subscription update: whichever of status and
    /// period end the event carried.
    pub async fn update_from_provider(
        &self,
        tenant_id: Uuid,
        status: Option<PlanStatus>,
        period_end: Option<OffsetDateTime>,
    ) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            UPDATE plan_records
            SET status = COALESCE($2, status),
                expires_at = COALESCE($3, expires_at),
                updated_at = NOW()
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .bind(period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Tenants whose plan has lapsed as of `now`: trial past its cutoff,
    /// paid past expiry plus the grace window, or provider-canceled.
    ///
    /// This over-selects on purpose (e.g. canceled records with no expiry);
    /// the sweep still routes every candidate through the evaluator, which
    /// alone decides whether teardown fires.
    pub async fn lapsed_tenant_ids(&self, now: OffsetDateTime) -> EntitlementResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT tenant_id
            FROM plan_records
            WHERE (trial_expires_at IS NOT NULL AND trial_expires_at < $1)
               OR (trial_expires_at IS NULL AND expires_at IS NOT NULL
                   AND expires_at + make_interval(days => $2::int) < $1)
               OR status = $3
            ORDER BY updated_at ASC
            "#,
        )
        .bind(now)
        .bind(GRACE_PERIOD_DAYS as i32)
        .bind(PlanStatus::Canceled)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
