//! # toll-api
//!
//! HTTP API layer for tollgate-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for passwordless login and payment orders
//! - Webhook endpoint for inbound gateway notifications
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/auth/send-otp` | Issue a login code |
//! | POST | `/api/auth/verify-otp` | Verify code, mint credential |
//! | POST | `/api/auth/login` | Superadmin login |
//! | GET | `/api/auth/me` | Current user |
//! | POST | `/api/auth/logout` | Logout acknowledgment |
//! | POST | `/api/payment/create-order` | Create order |
//! | GET | `/api/payment/order-status/{id}` | Order lookup |
//! | POST | `/api/payment/refund` | Refund a paid order |
//! | POST | `/api/payment/notify/{gateway}` | Gateway notification |

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
