//! # Mock Gateway
//!
//! Deterministic in-process provider. Registered under its own name and
//! also substituted for any real provider whose credentials are absent,
//! so the rest of the system behaves identically either way.

use async_trait::async_trait;
use serde::Deserialize;
use toll_core::{
    ChargeInit, CoreError, CoreResult, NotificationEvent, Order, PaymentGateway, PaymentOutcome,
    RawHeaders, WebhookAck,
};
use tracing::debug;

/// Notification payload the mock gateway accepts.
#[derive(Debug, Deserialize)]
struct MockNotification {
    order_id: String,
    outcome: PaymentOutcome,
    #[serde(default)]
    transaction_id: Option<String>,
}

pub struct MockGateway;

impl MockGateway {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_charge(&self, order: &Order) -> CoreResult<ChargeInit> {
        debug!(order_id = %order.id, "mock charge created");
        Ok(ChargeInit {
            provider_ref: format!("mock-charge-{}", order.id),
            init_data: serde_json::json!({
                "qr_code": format!("mock://pay/{}", order.id),
                "mock": true,
            }),
        })
    }

    async fn verify_notification(&self, _payload: &[u8], _headers: &RawHeaders) -> bool {
        // Nothing to verify against; the mock provider trusts its caller.
        true
    }

    fn parse_notification(
        &self,
        payload: &[u8],
        _headers: &RawHeaders,
    ) -> CoreResult<NotificationEvent> {
        let raw: MockNotification = serde_json::from_slice(payload)
            .map_err(|e| CoreError::NotificationParseError(e.to_string()))?;
        Ok(NotificationEvent {
            order_id: raw.order_id,
            outcome: raw.outcome,
            transaction_id: raw
                .transaction_id
                .or_else(|| Some("mock-txn".to_string())),
            gateway: "mock".to_string(),
        })
    }

    async fn refund(&self, order: &Order, _amount: i64, _reason: &str) -> CoreResult<String> {
        Ok(format!("mock-refund-{}", order.id))
    }

    fn success_ack(&self) -> WebhookAck {
        WebhookAck::json(200, serde_json::json!({ "code": "SUCCESS", "message": "OK" }))
    }

    fn failure_ack(&self) -> WebhookAck {
        WebhookAck::json(401, serde_json::json!({ "code": "FAIL", "message": "rejected" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use toll_core::Currency;

    fn order() -> Order {
        Order::new("user@example.com", 10000, Currency::USD, "Payment", "mock", Utc::now())
    }

    #[tokio::test]
    async fn test_deterministic_references() {
        let gw = MockGateway::new();
        let order = order();

        let init = gw.create_charge(&order).await.unwrap();
        assert_eq!(init.provider_ref, format!("mock-charge-{}", order.id));
        assert_eq!(
            init.init_data["qr_code"],
            format!("mock://pay/{}", order.id)
        );

        let refund_ref = gw.refund(&order, 10000, "test").await.unwrap();
        assert_eq!(refund_ref, format!("mock-refund-{}", order.id));
    }

    #[tokio::test]
    async fn test_parse_notification() {
        let gw = MockGateway::new();
        let payload = serde_json::json!({
            "order_id": "ord-1",
            "outcome": "succeeded",
            "transaction_id": "txn-1",
        });

        let event = gw
            .parse_notification(payload.to_string().as_bytes(), &RawHeaders::new())
            .unwrap();
        assert_eq!(event.order_id, "ord-1");
        assert_eq!(event.outcome, PaymentOutcome::Succeeded);
        assert_eq!(event.transaction_id.as_deref(), Some("txn-1"));

        assert!(gw
            .parse_notification(b"garbage", &RawHeaders::new())
            .is_err());
    }

    #[test]
    fn test_acks() {
        let gw = MockGateway::new();
        assert_eq!(gw.success_ack().status, 200);
        assert_eq!(gw.failure_ack().status, 401);
    }
}
