//! Application configuration

use std::env;
use std::time::Duration;

use zaply_entitlement::gateway::GatewayConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Payment provider webhooks
    pub payment_webhook_secret: String,

    // WhatsApp gateway
    pub wa_gateway_url: String,
    pub wa_gateway_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            payment_webhook_secret: {
                let secret = env::var("PAYMENT_WEBHOOK_SECRET")
                    .map_err(|_| ConfigError::Missing("PAYMENT_WEBHOOK_SECRET"))?;
                // Signatures are HMAC-SHA256; a short secret undermines them
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "PAYMENT_WEBHOOK_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            wa_gateway_url: env::var("WA_GATEWAY_URL")
                .map_err(|_| ConfigError::Missing("WA_GATEWAY_URL"))?,
            wa_gateway_timeout_ms: env::var("WA_GATEWAY_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
        })
    }

    /// Gateway config for building the entitlement engine's client
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.wa_gateway_url.clone(),
            request_timeout: Duration::from_millis(self.wa_gateway_timeout_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "PAYMENT_WEBHOOK_SECRET",
            "test-webhook-secret-at-least-32-characters",
        );
        env::set_var("WA_GATEWAY_URL", "http://gateway.test");
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("PAYMENT_WEBHOOK_SECRET");
        env::remove_var("WA_GATEWAY_URL");
        env::remove_var("WA_GATEWAY_TIMEOUT_MS");
    }

    #[test]
    fn test_config_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        // === Test 1: Missing database URL ===
        cleanup_config();
        env::set_var(
            "PAYMENT_WEBHOOK_SECRET",
            "test-webhook-secret-at-least-32-characters",
        );
        env::set_var("WA_GATEWAY_URL", "http://gateway.test");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        // === Test 2: Weak webhook secret rejected ===
        setup_minimal_config();
        env::set_var("PAYMENT_WEBHOOK_SECRET", "short");
        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakSecret(_))));

        // === Test 3: Valid config accepted with defaults ===
        setup_minimal_config();
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.wa_gateway_timeout_ms, 10_000);

        // === Test 4: Gateway timeout override ===
        env::set_var("WA_GATEWAY_TIMEOUT_MS", "2500");
        let config = Config::from_env().unwrap();
        assert_eq!(config.wa_gateway_timeout_ms, 2_500);
        assert_eq!(
            config.gateway_config().request_timeout,
            Duration::from_millis(2_500)
        );

        cleanup_config();
    }
}
