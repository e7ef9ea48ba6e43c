//! HTTP routes

pub mod entitlement;
pub mod health;
pub mod payment_webhook;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route(
            "/api/tenants/:tenant_id/entitlement",
            get(entitlement::get_entitlement),
        )
        .route(
            "/api/tenants/:tenant_id/sessions/disconnect",
            post(entitlement::disconnect_sessions),
        )
        .route(
            "/api/tenants/:tenant_id/plan-events",
            get(entitlement::plan_events),
        )
        .route("/webhooks/payment", post(payment_webhook::payment_webhook))
        .with_state(state)
}
