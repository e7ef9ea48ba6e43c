//! Entitlement and session management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use zaply_entitlement::evaluate::Entitlement;
use zaply_entitlement::events::PlanEvent;
use zaply_entitlement::teardown::TeardownResult;

use crate::error::ApiResult;
use crate::state::AppState;

/// Evaluate a tenant's entitlement, enforcing teardown when it lapsed.
///
/// The dashboard polls this on mount and after billing actions. A 503
/// means the state is unknown - the client must not show expiry UI or
/// gate features on it.
pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Entitlement>> {
    let entitlement = state.entitlement.check_and_enforce(tenant_id).await?;
    Ok(Json(entitlement))
}

/// Explicit user-driven disconnect of every live session.
pub async fn disconnect_sessions(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TeardownResult>>> {
    let results = state.teardown.disconnect_all_sessions(tenant_id).await?;
    tracing::info!(
        tenant_id = %tenant_id,
        count = results.len(),
        "Manual session disconnect requested"
    );
    Ok(Json(results))
}

/// Recent plan lifecycle events for a tenant, newest first.
pub async fn plan_events(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PlanEvent>>> {
    let events = state.plan_events.recent_for_tenant(tenant_id, 50).await?;
    Ok(Json(events))
}
