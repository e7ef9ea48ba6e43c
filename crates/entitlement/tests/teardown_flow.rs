//! Integration tests for session teardown
//!
//! These verify the two properties the orchestrator leans on: teardown is
//! idempotent (a second run makes no gateway calls once everything is
//! disconnected), and a gateway failure is contained to its own session.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://..."   # migrated schema
//! cargo test -p zaply-entitlement --test teardown_flow -- --ignored
//! ```
//!
//! The gateway is pointed at an unreachable address on purpose: a test that
//! succeeds anyway proves no gateway call was attempted.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use zaply_entitlement::gateway::{GatewayClient, GatewayConfig};
use zaply_entitlement::teardown::TeardownService;

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

/// Gateway client aimed at a dead port with a short timeout. Any attempted
/// logout fails fast; a passing teardown therefore made no gateway calls.
fn unreachable_gateway() -> GatewayClient {
    GatewayClient::new(GatewayConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        request_timeout: Duration::from_millis(250),
    })
    .expect("Failed to build gateway client")
}

async fn insert_session(pool: &PgPool, tenant_id: Uuid, session_key: &str, status: &str) {
    sqlx::query(
        r#"
        INSERT INTO wa_sessions (session_key, tenant_id, session_token, status)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(session_key)
    .bind(tenant_id)
    .bind(format!("tok-{}", session_key))
    .bind(status)
    .execute(pool)
    .await
    .expect("Failed to insert test session");
}

async fn session_status(pool: &PgPool, session_key: &str) -> String {
    let (status,): (String,) =
        sqlx::query_as("SELECT status FROM wa_sessions WHERE session_key = $1")
            .bind(session_key)
            .fetch_one(pool)
            .await
            .expect("Failed to read session status");
    status
}

#[tokio::test]
#[ignore] // Requires database
async fn test_teardown_skips_disconnected_sessions() {
    let pool = setup_pool().await;
    let teardown = TeardownService::new(pool.clone(), unreachable_gateway());

    let tenant_id = Uuid::new_v4();
    let key = format!("wa-{}", Uuid::new_v4());
    insert_session(&pool, tenant_id, &key, "disconnected").await;

    // No live sessions: no gateway interaction, empty result, no error -
    // even though the gateway endpoint does not exist.
    let results = teardown.disconnect_all_sessions(tenant_id).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_gateway_failure_is_contained_per_session() {
    let pool = setup_pool().await;
    let teardown = TeardownService::new(pool.clone(), unreachable_gateway());

    let tenant_id = Uuid::new_v4();
    let key_a = format!("wa-{}", Uuid::new_v4());
    let key_b = format!("wa-{}", Uuid::new_v4());
    insert_session(&pool, tenant_id, &key_a, "connected").await;
    insert_session(&pool, tenant_id, &key_b, "pairing").await;

    let results = teardown.disconnect_all_sessions(tenant_id).await.unwrap();

    // Both sessions were attempted: one failure never aborts the batch.
    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    // Local status untouched on gateway failure; the next run retries.
    assert_eq!(session_status(&pool, &key_a).await, "connected");
    assert_eq!(session_status(&pool, &key_b).await, "pairing");
}

#[tokio::test]
#[ignore] // Requires database
async fn test_teardown_for_unknown_tenant_is_a_noop() {
    let pool = setup_pool().await;
    let teardown = TeardownService::new(pool.clone(), unreachable_gateway());

    let results = teardown
        .disconnect_all_sessions(Uuid::new_v4())
        .await
        .unwrap();
    assert!(results.is_empty());
}
