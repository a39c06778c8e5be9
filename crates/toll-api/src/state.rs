//! # Application State
//!
//! Shared state for the Axum application. Wires the in-memory stores,
//! system clock and configured gateways into the core services.

use std::sync::Arc;
use toll_core::{
    BoxedGateway, Clock, GatewayRegistry, InMemoryStore, LogNotifier, NotificationDispatcher,
    OrderLedger, OtpConfig, OtpRegistry, SystemClock, TokenIssuer,
};
use toll_providers::{AlipayGateway, MockGateway, WechatGateway};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Secret for signing bearer credentials
    pub jwt_secret: String,
    /// Static admin username, if configured
    pub superadmin_user: Option<String>,
    /// Static admin password, if configured
    pub superadmin_pass: Option<String>,
    /// Environment (development, staging, production)
    pub environment: String,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8787),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_default(),
            superadmin_user: std::env::var("SUPERADMIN_USER").ok().filter(|v| !v.is_empty()),
            superadmin_pass: std::env::var("SUPERADMIN_PASS").ok().filter(|v| !v.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Login challenge registry
    pub otp: Arc<OtpRegistry>,
    /// Bearer credential issuer
    pub tokens: Arc<TokenIssuer>,
    /// Order state machine
    pub ledger: Arc<OrderLedger>,
    /// Inbound webhook dispatcher
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create an AppState from the process environment.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(AppConfig::from_env())
    }

    /// Create an AppState from an explicit config. Gateways with
    /// credentials in the environment go live; the rest run in mock mode.
    pub fn with_config(config: AppConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let otp = Arc::new(OtpRegistry::new(
            Arc::new(InMemoryStore::new()),
            clock.clone(),
            Arc::new(LogNotifier),
            OtpConfig::default(),
        ));

        let tokens = Arc::new(
            TokenIssuer::new(&config.jwt_secret, clock.clone())
                .map_err(|e| anyhow::anyhow!("Failed to initialize token issuer: {e}"))?,
        );

        let gateways = GatewayRegistry::new()
            .with_gateway(Arc::new(MockGateway::new()) as BoxedGateway)
            .with_gateway(Arc::new(WechatGateway::from_env()) as BoxedGateway)
            .with_gateway(Arc::new(AlipayGateway::from_env()) as BoxedGateway);

        let ledger = Arc::new(OrderLedger::new(
            Arc::new(InMemoryStore::new()),
            gateways,
            clock,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(ledger.clone()));

        Ok(Self {
            otp,
            tokens,
            ledger,
            dispatcher,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_defaults() {
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");

        let config = AppConfig::from_env();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8787);
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            jwt_secret: "secret".to_string(),
            superadmin_user: None,
            superadmin_pass: None,
            environment: "test".to_string(),
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_empty_jwt_secret_is_fatal() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: String::new(),
            superadmin_user: None,
            superadmin_pass: None,
            environment: "test".to_string(),
        };

        assert!(AppState::with_config(config).is_err());
    }
}
