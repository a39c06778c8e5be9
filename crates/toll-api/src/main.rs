//! # Tollgate
//!
//! Auth and payment-order engine.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export JWT_SECRET=change-me
//! export SUPERADMIN_USER=admin
//! export SUPERADMIN_PASS=...
//!
//! # Optional gateway credentials (mock mode without them)
//! export WECHAT_APP_ID=... WECHAT_MCH_ID=... WECHAT_API_V3_KEY=...
//! export ALIPAY_APP_ID=... ALIPAY_SIGN_KEY=...
//!
//! # Run the server
//! tollgate
//! ```

use toll_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Initialize application state
    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Payment gateways: {:?}", state.ledger.gateways().names());

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("Tollgate starting on http://{}", addr);

    if !is_prod {
        info!("Health: GET http://{}/health", addr);
        info!("Login: POST http://{}/api/auth/send-otp", addr);
        info!("Orders: POST http://{}/api/payment/create-order", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
