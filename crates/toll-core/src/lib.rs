//! # toll-core
//!
//! Core types and state machines for the tollgate auth/payment engine.
//!
//! This crate provides:
//! - `OtpRegistry` for passwordless login challenges (issue/verify with
//!   rate limiting and lazy expiry)
//! - `TokenIssuer` for signed, expiring bearer credentials
//! - `PaymentGateway` trait and `GatewayRegistry` for payment providers
//! - `OrderLedger` for the order state machine and idempotent
//!   notification handling
//! - `NotificationDispatcher` for verifying and routing inbound webhooks
//! - `KeyValueStore` / `Clock` / `Notifier` capabilities so storage, time
//!   and delivery are injectable
//!
//! ## Example
//!
//! ```rust,ignore
//! use toll_core::{GatewayRegistry, OrderLedger, Currency};
//!
//! let ledger = OrderLedger::new(store, gateways, clock);
//!
//! // Create an order; the gateway initiates payment exactly once.
//! let (order, init) = ledger
//!     .create("user@example.com", 10_000, Currency::USD, "Payment", "mock")
//!     .await?;
//!
//! // Later, a verified webhook transitions it.
//! dispatcher.dispatch("mock", &payload, &headers).await;
//! ```

pub mod clock;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod notifier;
pub mod order;
pub mod otp;
pub mod store;
pub mod token;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::NotificationDispatcher;
pub use error::{CoreError, CoreResult};
pub use gateway::{
    BoxedGateway, ChargeInit, GatewayRegistry, PaymentGateway, RawHeaders, WebhookAck,
};
pub use ledger::{NotificationDisposition, OrderLedger, RefundReceipt};
pub use notifier::{Channel, LogNotifier, Notifier};
pub use order::{
    Currency, NotificationEvent, Order, OrderStatus, PaymentOutcome, RefundRecord,
};
pub use otp::{classify_target, IssuedOtp, OtpChallenge, OtpConfig, OtpRegistry};
pub use store::{InMemoryStore, KeyValueStore, VersionConflict, Versioned};
pub use token::{Role, Subject, TokenIssuer, TokenRejection};
