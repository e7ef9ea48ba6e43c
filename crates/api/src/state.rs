//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use zaply_entitlement::events::PlanEventLogger;
use zaply_entitlement::gateway::GatewayClient;
use zaply_entitlement::orchestrator::EntitlementService;
use zaply_entitlement::payment_events::PaymentEventReducer;
use zaply_entitlement::teardown::TeardownService;

use crate::config::Config;

/// Shared state cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub entitlement: Arc<EntitlementService>,
    pub teardown: Arc<TeardownService>,
    pub reducer: Arc<PaymentEventReducer>,
    pub plan_events: Arc<PlanEventLogger>,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, gateway: GatewayClient) -> Self {
        Self {
            entitlement: Arc::new(EntitlementService::new(pool.clone(), gateway.clone())),
            teardown: Arc::new(TeardownService::new(pool.clone(), gateway)),
            reducer: Arc::new(PaymentEventReducer::new(pool.clone())),
            plan_events: Arc::new(PlanEventLogger::new(pool.clone())),
            config: Arc::new(config),
            pool,
        }
    }
}
