//! Zaply Worker
//!
//! Background jobs: the periodic entitlement sweep that reconciles lapsed
//! plans with live WhatsApp sessions, and payment-event retention cleanup.
//! Both jobs are safe to re-run at any cadence; the sweep is the
//! reconciliation mechanism between "plan says expired" and "sessions say
//! disconnected".

mod sweep;

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};

use zaply_entitlement::gateway::GatewayClient;
use zaply_entitlement::orchestrator::EntitlementService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = zaply_shared::db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;

    let gateway = GatewayClient::from_env().context("Failed to build gateway client")?;
    let entitlement = Arc::new(EntitlementService::new(pool.clone(), gateway));

    let sweep_schedule = std::env::var("ENTITLEMENT_SWEEP_SCHEDULE")
        .unwrap_or_else(|_| "0 */15 * * * *".to_string());
    let cleanup_schedule = std::env::var("PAYMENT_EVENT_CLEANUP_SCHEDULE")
        .unwrap_or_else(|_| "0 0 4 * * *".to_string());
    let retention_days: i32 = std::env::var("PAYMENT_EVENT_RETENTION_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(90);

    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    {
        let entitlement = entitlement.clone();
        let pool = pool.clone();
        let job = Job::new_async(sweep_schedule.as_str(), move |_id, _lock| {
            let entitlement = entitlement.clone();
            let pool = pool.clone();
            Box::pin(async move {
                sweep::run_entitlement_sweep(&pool, &entitlement).await;
            })
        })
        .context("Invalid entitlement sweep schedule")?;
        scheduler
            .add(job)
            .await
            .context("Failed to schedule entitlement sweep")?;
    }

    {
        let pool = pool.clone();
        let job = Job::new_async(cleanup_schedule.as_str(), move |_id, _lock| {
            let pool = pool.clone();
            Box::pin(async move {
                sweep::cleanup_old_payment_events(&pool, retention_days).await;
            })
        })
        .context("Invalid payment event cleanup schedule")?;
        scheduler
            .add(job)
            .await
            .context("Failed to schedule payment event cleanup")?;
    }

    scheduler.start().await.context("Failed to start scheduler")?;
    tracing::info!(
        sweep = %sweep_schedule,
        cleanup = %cleanup_schedule,
        "Zaply worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down worker");
    Ok(())
}
