//! # Core Error Types
//!
//! Typed error handling for the tollgate engine.
//! All registry, ledger and gateway operations return `Result<T, CoreError>`.

use thiserror::Error;

/// Core error type for all auth and payment operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration errors (missing secrets, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Contact identifier is neither a valid email nor phone number
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// OTP issuance rate limited (cool-down or rolling-window cap)
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: i64 },

    /// The notifier could not deliver the OTP
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// No live OTP challenge for this identifier
    #[error("No verification code found")]
    OtpNotFound,

    /// The OTP challenge expired before verification
    #[error("Verification code expired")]
    OtpExpired,

    /// Submitted code does not match the stored challenge
    #[error("Invalid verification code")]
    OtpMismatch,

    /// Static credential login failed
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing or unverifiable bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Requester is neither the resource owner nor an admin
    #[error("Access denied")]
    Forbidden,

    /// Order amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Currency code not supported
    #[error("Unsupported currency: {currency}")]
    UnsupportedCurrency { currency: String },

    /// No gateway registered under this name
    #[error("Unknown payment gateway: {gateway}")]
    UnknownGateway { gateway: String },

    /// Order does not exist
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// Notification references an order this instance never created
    #[error("Notification for unknown order: {order_id}")]
    UnknownOrder { order_id: String },

    /// Notification would move the order against the state machine
    #[error("Invalid transition: order {order_id} is {status}, notification says {outcome}")]
    InvalidTransition {
        order_id: String,
        status: String,
        outcome: String,
    },

    /// Refund requested on an order that is not in `paid` state
    #[error("Order not eligible for refund: {order_id}")]
    NotRefundable { order_id: String },

    /// Gateway API error
    #[error("Gateway error [{gateway}]: {message}")]
    Gateway { gateway: String, message: String },

    /// Gateway call exceeded the configured deadline
    #[error("Gateway timed out: {gateway}")]
    GatewayTimeout { gateway: String },

    /// Webhook signature verification failed
    #[error("Notification verification failed: {0}")]
    NotificationVerificationFailed(String),

    /// Webhook payload could not be parsed
    #[error("Notification parse error: {0}")]
    NotificationParseError(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::Configuration(_) => 500,
            CoreError::InvalidTarget(_) => 400,
            CoreError::RateLimited { .. } => 429,
            CoreError::DeliveryFailed(_) => 502,
            CoreError::OtpNotFound => 400,
            CoreError::OtpExpired => 400,
            CoreError::OtpMismatch => 400,
            CoreError::InvalidCredentials => 401,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden => 403,
            CoreError::InvalidAmount(_) => 400,
            CoreError::UnsupportedCurrency { .. } => 400,
            CoreError::UnknownGateway { .. } => 400,
            CoreError::OrderNotFound { .. } => 404,
            CoreError::UnknownOrder { .. } => 404,
            CoreError::InvalidTransition { .. } => 409,
            CoreError::NotRefundable { .. } => 409,
            CoreError::Gateway { .. } => 502,
            CoreError::GatewayTimeout { .. } => 504,
            CoreError::NotificationVerificationFailed(_) => 401,
            CoreError::NotificationParseError(_) => 400,
            CoreError::Internal(_) => 500,
        }
    }

    /// Returns true if a caller may retry this operation.
    /// The core itself never auto-retries outbound gateway calls:
    /// duplicate charge creation is worse than a failed response.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::GatewayTimeout { .. }
                | CoreError::Gateway { .. }
                | CoreError::DeliveryFailed(_)
        )
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CoreError::RateLimited { retry_after_secs: 60 }.status_code(), 429);
        assert_eq!(CoreError::OtpMismatch.status_code(), 400);
        assert_eq!(CoreError::Forbidden.status_code(), 403);
        assert_eq!(
            CoreError::OrderNotFound { order_id: "x".into() }.status_code(),
            404
        );
        assert_eq!(
            CoreError::GatewayTimeout { gateway: "wechat".into() }.status_code(),
            504
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CoreError::GatewayTimeout { gateway: "alipay".into() }.is_retryable());
        assert!(CoreError::DeliveryFailed("smtp down".into()).is_retryable());
        assert!(!CoreError::OtpMismatch.is_retryable());
        assert!(!CoreError::Forbidden.is_retryable());
    }

    #[test]
    fn test_auth_failures_share_wording() {
        // Unauthorized and Forbidden bodies must not leak which check failed
        // beyond the status itself.
        assert_eq!(CoreError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(CoreError::Forbidden.to_string(), "Access denied");
    }
}
