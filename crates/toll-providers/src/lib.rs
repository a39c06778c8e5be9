//! # toll-providers
//!
//! Payment gateway implementations for tollgate-rs.
//!
//! Each provider implements `toll_core::PaymentGateway`:
//!
//! 1. **WechatGateway**: WeChat Pay native (QR) flow
//! 2. **AlipayGateway**: Alipay page-pay flow
//! 3. **MockGateway**: deterministic in-process provider
//!
//! Providers are constructed from environment variables; incomplete
//! credentials select mock mode rather than failing startup, so the
//! reference deployment runs without any secrets.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use toll_providers::{AlipayGateway, MockGateway, WechatGateway};
//! use toll_core::GatewayRegistry;
//!
//! let registry = GatewayRegistry::new()
//!     .with_gateway(Arc::new(MockGateway::new()))
//!     .with_gateway(Arc::new(WechatGateway::from_env()))
//!     .with_gateway(Arc::new(AlipayGateway::from_env()));
//! ```

pub mod alipay;
pub mod config;
pub mod mock;
pub mod sig;
pub mod wechat;

// Re-exports
pub use alipay::AlipayGateway;
pub use config::{AlipayConfig, WechatConfig};
pub use mock::MockGateway;
pub use wechat::WechatGateway;
