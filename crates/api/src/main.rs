//! Zaply API server entry point

use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use zaply_api::{routes, AppState, Config};
use zaply_entitlement::gateway::GatewayClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = zaply_shared::db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    zaply_shared::db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let gateway = GatewayClient::new(config.gateway_config())
        .context("Failed to build gateway client")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool, gateway);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(addr = %bind_address, "Zaply API listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
