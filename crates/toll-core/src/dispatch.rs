//! # Notification Dispatcher
//!
//! Receives raw inbound webhook payloads tagged with a gateway name,
//! verifies authenticity through the gateway abstraction, and forwards the
//! normalized event to the order ledger. The acknowledgment returned to the
//! gateway is gateway-specific: each provider defines what response means
//! "received, stop retrying" versus "retry me".

use crate::error::CoreError;
use crate::gateway::{RawHeaders, WebhookAck};
use crate::ledger::{NotificationDisposition, OrderLedger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Default bound on a gateway's verification call.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct NotificationDispatcher {
    ledger: Arc<OrderLedger>,
    verify_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(ledger: Arc<OrderLedger>) -> Self {
        Self {
            ledger,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Handle one inbound webhook delivery.
    ///
    /// Authenticity failures answer with the gateway's failure ack and are
    /// never forwarded. Once verified, the ledger's verdict does not change
    /// the acknowledgment: duplicates, unknown orders and invalid
    /// transitions are logged and acked as received. Telling the gateway
    /// to retry a transition we cannot apply would only cause infinite
    /// redelivery of the same event.
    #[instrument(skip(self, payload, headers), fields(gateway = %gateway_name, bytes = payload.len()))]
    pub async fn dispatch(
        &self,
        gateway_name: &str,
        payload: &[u8],
        headers: &RawHeaders,
    ) -> WebhookAck {
        let Some(gateway) = self.ledger.gateways().get(gateway_name) else {
            warn!("notification for unregistered gateway");
            return WebhookAck::text(404, "unknown gateway");
        };

        let verified =
            tokio::time::timeout(self.verify_timeout, gateway.verify_notification(payload, headers))
                .await
                .unwrap_or_else(|_| {
                    warn!("notification verification timed out");
                    false
                });

        if !verified {
            warn!("notification failed authenticity check");
            return gateway.failure_ack();
        }

        let event = match gateway.parse_notification(payload, headers) {
            Ok(event) => event,
            Err(e) => {
                // Authentic but unparseable: acknowledge so the gateway
                // stops redelivering a payload we can never apply.
                error!("verified notification could not be parsed: {e}");
                return gateway.success_ack();
            }
        };

        match self.ledger.apply_notification(&event) {
            Ok(NotificationDisposition::Applied) => {
                info!(order_id = %event.order_id, "notification applied");
            }
            Ok(NotificationDisposition::Duplicate) => {
                info!(order_id = %event.order_id, "duplicate notification acknowledged");
            }
            Err(CoreError::UnknownOrder { order_id }) => {
                // Possibly an order created before a restart; ack and log.
                warn!(order_id = %order_id, "notification for unknown order, acknowledged");
            }
            Err(e) => {
                warn!("notification rejected by ledger: {e}");
            }
        }

        gateway.success_ack()
    }
}
