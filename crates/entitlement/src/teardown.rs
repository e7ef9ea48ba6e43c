//! Session Teardown Service
//!
//! Forced disconnection of all of a tenant's WhatsApp sessions after loss
//! of entitlement, or on explicit user request.
//!
//! ## Key Properties
//! - Idempotent: only sessions the local store still considers live are
//!   acted on, so re-running after a full success makes no gateway calls
//! - Partial failure tolerated: one bad session never blocks the rest
//! - Local status flips to disconnected only after the gateway confirms

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use zaply_shared::types::WaSession;

use crate::error::EntitlementResult;
use crate::gateway::GatewayClient;

/// Outcome of disconnecting one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownResult {
    pub session_key: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Session teardown service
pub struct TeardownService {
    pool: PgPool,
    gateway: GatewayClient,
}

impl TeardownService {
    pub fn new(pool: PgPool, gateway: GatewayClient) -> Self {
        Self { pool, gateway }
    }

    /// All sessions the local store still considers live (pairing or
    /// connected). Disconnected rows are skipped - that is what makes
    /// repeated teardown a no-op.
    async fn live_sessions(&self, tenant_id: Uuid) -> EntitlementResult<Vec<WaSession>> {
        let sessions: Vec<WaSession> = sqlx::query_as(
            r#"
            SELECT tenant_id, session_key, session_token, status, updated_at
            FROM wa_sessions
            WHERE tenant_id = $1 AND status IN ('pairing', 'connected')
            ORDER BY session_key
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn mark_disconnected(&self, session_key: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE wa_sessions
            SET status = 'disconnected', updated_at = NOW()
            WHERE session_key = $1
            "#,
        )
        .bind(session_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Disconnect every live session of a tenant.
    ///
    /// Sessions are handled one at a time, each with its own per-session
    /// gateway token. A gateway failure is recorded in that session's
    /// result and the batch continues; the caller gets the full list and
    /// can decide whether to retry.
    pub async fn disconnect_all_sessions(
        &self,
        tenant_id: Uuid,
    ) -> EntitlementResult<Vec<TeardownResult>> {
        let sessions = self.live_sessions(tenant_id).await?;
        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(sessions.len());
        for session in sessions {
            let result = self.disconnect_one(tenant_id, &session).await;
            results.push(result);
        }

        Ok(results)
    }

    async fn disconnect_one(&self, tenant_id: Uuid, session: &WaSession) -> TeardownResult {
        if let Err(e) = self
            .gateway
            .logout(&session.session_key, &session.session_token)
            .await
        {
            tracing::warn!(
                tenant_id = %tenant_id,
                session_key = %session.session_key,
                error = %e,
                "Gateway logout failed, continuing with remaining sessions"
            );
            return TeardownResult {
                session_key: session.session_key.clone(),
                success: false,
                error: Some(e.to_string()),
            };
        }

        // Update local status strictly after the gateway confirms. If the
        // update fails the row stays live and the next run retries; the
        // gateway treats the repeated logout as a no-op.
        if let Err(e) = self.mark_disconnected(&session.session_key).await {
            tracing::error!(
                tenant_id = %tenant_id,
                session_key = %session.session_key,
                error = %e,
                "Failed to mark session disconnected"
            );
            return TeardownResult {
                session_key: session.session_key.clone(),
                success: false,
                error: Some(format!("Session store update failed: {}", e)),
            };
        }

        tracing::info!(
            tenant_id = %tenant_id,
            session_key = %session.session_key,
            "Disconnected session"
        );
        TeardownResult {
            session_key: session.session_key.clone(),
            success: true,
            error: None,
        }
    }
}
