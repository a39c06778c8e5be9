//! # Routes
//!
//! Axum router configuration for the auth and payment API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Auth:
///   - POST /api/auth/send-otp - Issue a login code
///   - POST /api/auth/verify-otp - Verify a code, mint a credential
///   - POST /api/auth/login - Static superadmin login
///   - GET  /api/auth/me - Current user
///   - POST /api/auth/logout - Logout acknowledgment
///
/// - Payments:
///   - POST /api/payment/create-order - Create order, initiate payment
///   - GET  /api/payment/order-status/{order_id} - Order lookup
///   - POST /api/payment/refund - Refund a paid order
///   - POST /api/payment/notify/{gateway} - Inbound gateway notification
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - allow all origins for now
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/send-otp", post(handlers::send_otp))
        .route("/verify-otp", post(handlers::verify_otp))
        .route("/login", post(handlers::login))
        .route("/me", get(handlers::me))
        .route("/logout", post(handlers::logout));

    // Notification route must accept raw bodies; signatures cover the
    // exact bytes on the wire.
    let payment_routes = Router::new()
        .route("/create-order", post(handlers::create_order))
        .route("/order-status/{order_id}", get(handlers::order_status))
        .route("/refund", post(handlers::refund))
        .route("/notify/{gateway}", post(handlers::gateway_notify));

    Router::new()
        // Health check at root
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        // API
        .nest("/api/auth", auth_routes)
        .nest("/api/payment", payment_routes)
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}
