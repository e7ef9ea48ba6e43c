//! WhatsApp Gateway Client
//!
//! Thin HTTP client for the WhatsApp gateway. The entitlement engine only
//! needs the logout call; everything else the gateway offers (pairing,
//! message send) is driven by other parts of the platform.

use std::time::Duration;

use reqwest::Client;

use crate::error::{EntitlementError, EntitlementResult};

/// Default timeout for gateway requests. One unresponsive session must not
/// stall a whole teardown batch.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the WhatsApp gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway HTTP API
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Create config from environment variables
    pub fn from_env() -> EntitlementResult<Self> {
        Ok(Self {
            base_url: std::env::var("WA_GATEWAY_URL")
                .map_err(|_| EntitlementError::Config("WA_GATEWAY_URL not set".to_string()))?,
            request_timeout: std::env::var("WA_GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(REQUEST_TIMEOUT),
        })
    }
}

/// WhatsApp gateway client
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    config: GatewayConfig,
}

impl GatewayClient {
    /// Create a new gateway client from config
    pub fn new(config: GatewayConfig) -> EntitlementResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                EntitlementError::Config(format!("Failed to build gateway HTTP client: {}", e))
            })?;

        Ok(Self { http, config })
    }

    /// Create a new gateway client from environment variables
    pub fn from_env() -> EntitlementResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    /// Log one session out of the gateway.
    ///
    /// Authenticates with the session's own token - gateway tokens are
    /// per-session, so a wrong token fails that session without touching
    /// the others. Non-2xx is a per-session failure, not a hard fault; the
    /// gateway treats logout of an already-logged-out session as a no-op.
    pub async fn logout(&self, session_key: &str, session_token: &str) -> EntitlementResult<()> {
        let url = format!(
            "{}/sessions/{}/logout",
            self.config.base_url.trim_end_matches('/'),
            session_key
        );

        let response = self
            .http
            .delete(&url)
            .bearer_auth(session_token)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(EntitlementError::Gateway(format!(
            "Logout of session {} returned {}: {}",
            session_key, status, body
        )))
    }
}
