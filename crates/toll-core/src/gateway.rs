//! # Gateway Abstraction
//!
//! Capability trait every payment provider plugs into. The core never
//! inspects provider-specific payload shapes; it only calls the four
//! operations here plus the acknowledgment hooks. Providers without real
//! credentials still implement the trait in mock mode with deterministic
//! placeholder references, so the rest of the system behaves identically
//! with or without credentials.

use crate::error::CoreResult;
use crate::order::{NotificationEvent, Order};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw request headers handed to `parse_notification`/`verify_notification`,
/// keys lowercased by the transport layer.
pub type RawHeaders = HashMap<String, String>;

/// What a gateway returns from `create_charge`: its own reference for the
/// charge plus whatever the client needs to complete payment (QR code
/// content, redirect URL).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChargeInit {
    pub provider_ref: String,
    pub init_data: Value,
}

/// The response a gateway expects as webhook acknowledgment. Gateways
/// differ in what body/status means "stop retrying" versus "retry me".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl WebhookAck {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }
}

/// Core trait for payment provider implementations.
///
/// Gateway calls that leave the process (`create_charge`, `refund`,
/// `verify_notification`) are bounded by the caller's timeout; none of
/// them may hang the ledger or dispatcher.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name used for registry lookup and webhook routing.
    fn name(&self) -> &'static str;

    /// Initiate payment for a freshly created order.
    async fn create_charge(&self, order: &Order) -> CoreResult<ChargeInit>;

    /// Check notification authenticity. `false` means the dispatcher must
    /// answer with `failure_ack` and drop the payload unforwarded.
    async fn verify_notification(&self, payload: &[u8], headers: &RawHeaders) -> bool;

    /// Normalize a verified notification into the ledger's event shape.
    fn parse_notification(
        &self,
        payload: &[u8],
        headers: &RawHeaders,
    ) -> CoreResult<NotificationEvent>;

    /// Refund a paid order (partial or full). Returns the gateway's refund
    /// reference.
    async fn refund(&self, order: &Order, amount: i64, reason: &str) -> CoreResult<String>;

    /// Acknowledgment telling this gateway the notification was received
    /// and must not be redelivered.
    fn success_ack(&self) -> WebhookAck;

    /// Acknowledgment telling this gateway the notification was rejected
    /// (bad authenticity) and may be retried.
    fn failure_ack(&self) -> WebhookAck;
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type BoxedGateway = Arc<dyn PaymentGateway>;

/// Maps gateway name to implementation, populated once at startup.
/// Absence of credentials selects a mock implementation at registration
/// time instead of a null checked ad hoc at each call site.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, BoxedGateway>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: BoxedGateway) {
        self.gateways.insert(gateway.name().to_string(), gateway);
    }

    pub fn with_gateway(mut self, gateway: BoxedGateway) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedGateway> {
        self.gateways.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.gateways.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.gateways.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::order::PaymentOutcome;

    pub(crate) struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn create_charge(&self, order: &Order) -> CoreResult<ChargeInit> {
            Ok(ChargeInit {
                provider_ref: format!("stub-{}", order.id),
                init_data: serde_json::json!({ "pay_url": format!("stub://pay/{}", order.id) }),
            })
        }

        async fn verify_notification(&self, _payload: &[u8], _headers: &RawHeaders) -> bool {
            true
        }

        fn parse_notification(
            &self,
            payload: &[u8],
            _headers: &RawHeaders,
        ) -> CoreResult<NotificationEvent> {
            serde_json::from_slice(payload)
                .map_err(|e| CoreError::NotificationParseError(e.to_string()))
        }

        async fn refund(&self, order: &Order, _amount: i64, _reason: &str) -> CoreResult<String> {
            Ok(format!("stub-refund-{}", order.id))
        }

        fn success_ack(&self) -> WebhookAck {
            WebhookAck::text(200, "ok")
        }

        fn failure_ack(&self) -> WebhookAck {
            WebhookAck::text(401, "nope")
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GatewayRegistry::new().with_gateway(Arc::new(StubGateway));

        assert!(registry.has("stub"));
        assert!(!registry.has("stripe"));
        assert_eq!(registry.get("stub").unwrap().name(), "stub");
        assert_eq!(registry.names(), vec!["stub"]);
    }

    #[tokio::test]
    async fn test_stub_round_trip() {
        let gw = StubGateway;
        let event = NotificationEvent {
            order_id: "abc".to_string(),
            outcome: PaymentOutcome::Succeeded,
            transaction_id: Some("txn-1".to_string()),
            gateway: "stub".to_string(),
        };
        let payload = serde_json::to_vec(&event).unwrap();

        assert!(gw.verify_notification(&payload, &RawHeaders::new()).await);
        let parsed = gw.parse_notification(&payload, &RawHeaders::new()).unwrap();
        assert_eq!(parsed.order_id, "abc");
        assert_eq!(parsed.outcome, PaymentOutcome::Succeeded);
    }
}
