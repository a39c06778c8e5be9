//! # Order Ledger
//!
//! Owns order records and the order state machine. Orders are created
//! locally, gateways are asked to initiate payment exactly once, and
//! asynchronous gateway notifications are applied idempotently: webhook
//! delivery is at-least-once and out-of-order, so replaying an event must
//! land on the same final state as applying it once.
//!
//! Mutations on the same order id are serialized through versioned
//! compare-and-swap on the store; orders never contend with each other.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::gateway::{ChargeInit, GatewayRegistry};
use crate::order::{Currency, NotificationEvent, Order, OrderStatus, PaymentOutcome, RefundRecord};
use crate::store::KeyValueStore;
use crate::token::Subject;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Default bound on outbound gateway calls.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// How an accepted notification affected the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDisposition {
    /// The order transitioned.
    Applied,
    /// Redelivery of an already-applied event; nothing changed.
    Duplicate,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: String,
    /// Refunded amount in minor units.
    pub amount: i64,
    pub order_id: String,
}

pub struct OrderLedger {
    store: Arc<dyn KeyValueStore<Order>>,
    gateways: GatewayRegistry,
    clock: Arc<dyn Clock>,
    gateway_timeout: Duration,
}

impl OrderLedger {
    pub fn new(
        store: Arc<dyn KeyValueStore<Order>>,
        gateways: GatewayRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateways,
            clock,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    /// Create an order and ask its gateway to initiate payment.
    ///
    /// The order is persisted in `pending` before the gateway call and is
    /// never rolled back on gateway failure: the charge may have succeeded
    /// despite a failed response path, and a later webhook must still find
    /// the order to reconcile against. Exactly one outbound charge call is
    /// made per creation; the core never retries it.
    #[instrument(skip(self), fields(user = %user_id, gateway = %gateway))]
    pub async fn create(
        &self,
        user_id: &str,
        amount: i64,
        currency: Currency,
        description: &str,
        gateway: &str,
    ) -> CoreResult<(Order, ChargeInit)> {
        if amount <= 0 {
            return Err(CoreError::InvalidAmount(format!(
                "amount must be positive, got {}",
                currency.from_minor_units(amount)
            )));
        }

        let gw = self
            .gateways
            .get(gateway)
            .ok_or_else(|| CoreError::UnknownGateway {
                gateway: gateway.to_string(),
            })?;

        let order = Order::new(
            user_id,
            amount,
            currency,
            description,
            gateway,
            self.clock.now(),
        );
        self.store.put(&order.id, order.clone());
        info!(order_id = %order.id, "order created");

        let init = tokio::time::timeout(self.gateway_timeout, gw.create_charge(&order))
            .await
            .map_err(|_| CoreError::GatewayTimeout {
                gateway: gateway.to_string(),
            })?
            .map_err(|e| {
                // Order stays pending and queryable; only the response fails.
                warn!(order_id = %order.id, "charge initiation failed: {e}");
                e
            })?;

        Ok((order, init))
    }

    /// Apply a verified gateway notification to its order, idempotently.
    ///
    /// - unknown order: rejected with `UnknownOrder`, logged, never fatal,
    ///   since a notification may reference an order created before a
    ///   restart of this volatile instance
    /// - terminal state already matching the outcome: duplicate no-op
    /// - `pending` + succeeded → `paid`; `pending` + failed → `failed`
    /// - anything else: `InvalidTransition`, logged for manual review and
    ///   never silently applied
    #[instrument(skip(self, event), fields(order_id = %event.order_id, outcome = %event.outcome))]
    pub fn apply_notification(
        &self,
        event: &NotificationEvent,
    ) -> CoreResult<NotificationDisposition> {
        loop {
            let entry = self
                .store
                .get(&event.order_id)
                .ok_or_else(|| CoreError::UnknownOrder {
                    order_id: event.order_id.clone(),
                })?;
            let mut order = entry.value;

            match (order.status, event.outcome) {
                (OrderStatus::Paid, PaymentOutcome::Succeeded)
                | (OrderStatus::Failed, PaymentOutcome::Failed) => {
                    info!("duplicate notification, no-op");
                    return Ok(NotificationDisposition::Duplicate);
                }
                (OrderStatus::Pending, PaymentOutcome::Succeeded) => {
                    order.status = OrderStatus::Paid;
                    order.transaction_id = event.transaction_id.clone();
                }
                (OrderStatus::Pending, PaymentOutcome::Failed) => {
                    order.status = OrderStatus::Failed;
                    order.transaction_id = event.transaction_id.clone();
                }
                (status, outcome) => {
                    warn!("invalid transition, kept for manual review");
                    return Err(CoreError::InvalidTransition {
                        order_id: order.id,
                        status: status.to_string(),
                        outcome: outcome.to_string(),
                    });
                }
            }

            order.updated_at = self.clock.now();
            let new_status = order.status;
            match self
                .store
                .compare_and_swap(&event.order_id, Some(entry.version), order)
            {
                Ok(_) => {
                    info!(status = %new_status, "order transitioned");
                    return Ok(NotificationDisposition::Applied);
                }
                // Lost a race against a concurrent delivery; re-evaluate
                // from the fresh version so duplicates collapse to no-ops.
                Err(_) => continue,
            }
        }
    }

    /// Refund a paid order, fully or partially. Only one refund transition
    /// is representable per order; a second attempt fails `NotRefundable`.
    #[instrument(skip(self, requester), fields(order_id = %order_id, requester = %requester.id))]
    pub async fn refund(
        &self,
        order_id: &str,
        requester: &Subject,
        amount: Option<i64>,
        reason: Option<String>,
    ) -> CoreResult<RefundReceipt> {
        let entry = self
            .store
            .get(order_id)
            .ok_or_else(|| CoreError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        let order = entry.value;

        if !order.is_owned_by(&requester.id) && !requester.role.is_admin() {
            return Err(CoreError::Forbidden);
        }

        if order.status != OrderStatus::Paid {
            return Err(CoreError::NotRefundable {
                order_id: order_id.to_string(),
            });
        }

        let amount = amount.unwrap_or(order.amount);
        if amount <= 0 || amount > order.amount {
            return Err(CoreError::InvalidAmount(format!(
                "refund amount must be positive and at most {}",
                order.amount_decimal()
            )));
        }
        let reason = reason.unwrap_or_else(|| "User requested refund".to_string());

        let gw = self
            .gateways
            .get(&order.gateway)
            .ok_or_else(|| CoreError::UnknownGateway {
                gateway: order.gateway.clone(),
            })?;

        let gateway_ref = tokio::time::timeout(
            self.gateway_timeout,
            gw.refund(&order, amount, &reason),
        )
        .await
        .map_err(|_| CoreError::GatewayTimeout {
            gateway: order.gateway.clone(),
        })??;

        let refund_id = Uuid::new_v4().to_string();
        let record = RefundRecord {
            refund_id: refund_id.clone(),
            amount,
            reason,
            gateway_ref,
        };

        let mut updated = order;
        updated.status = OrderStatus::Refunded;
        updated.refund = Some(record);
        updated.updated_at = self.clock.now();

        self.store
            .compare_and_swap(order_id, Some(entry.version), updated)
            .map_err(|_| {
                // A concurrent mutation won between the gateway call and
                // our transition; surface it instead of overwriting.
                warn!("order changed during refund, not transitioning");
                CoreError::NotRefundable {
                    order_id: order_id.to_string(),
                }
            })?;

        info!(refund_id = %refund_id, "order refunded");
        Ok(RefundReceipt {
            refund_id,
            amount,
            order_id: order_id.to_string(),
        })
    }

    /// Fetch an order for its owner or an admin.
    pub fn get_status(&self, order_id: &str, requester: &Subject) -> CoreResult<Order> {
        let entry = self
            .store
            .get(order_id)
            .ok_or_else(|| CoreError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        let order = entry.value;

        if !order.is_owned_by(&requester.id) && !requester.role.is_admin() {
            return Err(CoreError::Forbidden);
        }

        Ok(order)
    }
}
