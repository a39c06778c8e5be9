//! # Order Types
//!
//! Payment order records and the notification event shape consumed by the
//! ledger. Amounts are fixed-point in the currency's minor unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    CNY,
    USD,
    EUR,
    GBP,
    JPY,
    HKD,
}

impl Currency {
    /// Parse an ISO 4217 code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "CNY" => Some(Currency::CNY),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "JPY" => Some(Currency::JPY),
            "HKD" => Some(Currency::HKD),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::CNY => "CNY",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::HKD => "HKD",
        }
    }

    /// Number of decimal places (JPY has 0, the rest 2).
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the minor currency unit (cents, fen).
    pub fn to_minor_units(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from the minor unit back to decimal.
    pub fn from_minor_units(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::CNY
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order lifecycle. Transitions are monotonic:
/// `pending → paid → refunded` and `pending → failed`; `failed` and
/// `refunded` are terminal, nothing leaves `paid` except a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded when an order transitions to `refunded`. One refund transition
/// per order; cumulative partial-refund totals are not tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: String,
    /// Refunded amount in minor units; may be less than the order total.
    pub amount: i64,
    pub reason: String,
    /// Gateway-assigned reference for the refund.
    pub gateway_ref: String,
}

/// A payment order. The amount, currency and bound gateway are immutable
/// after creation; only the ledger mutates status and the terminal fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Server-generated unique id
    pub id: String,

    /// Owning user id
    pub user_id: String,

    /// Amount in minor currency units, always positive
    pub amount: i64,

    pub currency: Currency,

    pub description: String,

    /// Gateway bound at creation, never changes
    pub gateway: String,

    pub status: OrderStatus,

    /// Gateway transaction id, set when the order is paid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Set on the refund transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<RefundRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        user_id: impl Into<String>,
        amount: i64,
        currency: Currency,
        description: impl Into<String>,
        gateway: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            amount,
            currency,
            description: description.into(),
            gateway: gateway.into(),
            status: OrderStatus::Pending,
            transaction_id: None,
            refund: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decimal amount for display and responses.
    pub fn amount_decimal(&self) -> f64 {
        self.currency.from_minor_units(self.amount)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Outcome a gateway notification claims for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcome::Succeeded => write!(f, "succeeded"),
            PaymentOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Normalized, ephemeral gateway notification. Produced by a gateway's
/// `parse_notification`, consumed once by the ledger, never stored. Only
/// the *effect* of applying it is retained, idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Order id the gateway claims this notification is for
    pub order_id: String,

    pub outcome: PaymentOutcome,

    /// Gateway-assigned transaction id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// Originating gateway name
    pub gateway: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_minor_units() {
        assert_eq!(Currency::USD.to_minor_units(100.00), 10000);
        assert_eq!(Currency::CNY.to_minor_units(0.01), 1);
        assert_eq!(Currency::JPY.to_minor_units(500.0), 500);
        assert_eq!(Currency::USD.from_minor_units(10000), 100.0);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::USD));
        assert_eq!(Currency::from_code("CNY"), Some(Currency::CNY));
        assert_eq!(Currency::from_code("BTC"), None);
    }

    #[test]
    fn test_new_order_starts_pending() {
        let order = Order::new(
            "user@example.com",
            10000,
            Currency::USD,
            "Payment",
            "mock",
            Utc::now(),
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.transaction_id.is_none());
        assert!(order.refund.is_none());
        assert!(order.is_owned_by("user@example.com"));
        assert!(!order.is_owned_by("someone-else"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }
}
