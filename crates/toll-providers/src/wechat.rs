//! # WeChat Pay Gateway
//!
//! Native (QR) payment flow. With credentials the charge and refund calls
//! go to the merchant API; without them the gateway runs in mock mode with
//! deterministic placeholder references, exactly like the mock provider.
//!
//! Notification authenticity uses HMAC-SHA256 over
//! `"{timestamp}\n{nonce}\n{body}\n"` under the API v3 key, a pluggable
//! stand-in for the platform certificate scheme.

use crate::config::WechatConfig;
use crate::sig::{constant_time_eq, hmac_sha256_hex};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use toll_core::{
    ChargeInit, CoreError, CoreResult, NotificationEvent, Order, PaymentGateway, PaymentOutcome,
    RawHeaders, WebhookAck,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub struct WechatGateway {
    config: Option<WechatConfig>,
    client: Client,
}

impl WechatGateway {
    pub fn new(config: Option<WechatConfig>) -> Self {
        if config.is_none() {
            info!("WeChat Pay not configured, using mock mode");
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(WechatConfig::from_env())
    }

    pub fn is_mock(&self) -> bool {
        self.config.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct WechatNotification {
    event_type: String,
    resource: WechatResource,
}

#[derive(Debug, Deserialize)]
struct WechatResource {
    out_trade_no: String,
    #[serde(default)]
    transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WechatChargeResponse {
    code_url: String,
}

#[derive(Debug, Deserialize)]
struct WechatRefundResponse {
    refund_id: String,
}

#[derive(Debug, Deserialize)]
struct WechatErrorResponse {
    message: String,
}

#[async_trait]
impl PaymentGateway for WechatGateway {
    fn name(&self) -> &'static str {
        "wechat"
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_charge(&self, order: &Order) -> CoreResult<ChargeInit> {
        let Some(config) = &self.config else {
            debug!("mock WeChat charge");
            return Ok(ChargeInit {
                provider_ref: format!("wechat-mock-{}", order.id),
                init_data: serde_json::json!({
                    "qr_code": format!("wechat://pay/mock/{}", order.id),
                    "mock": true,
                }),
            });
        };

        let url = format!("{}/v3/pay/transactions/native", config.api_base_url);
        let body = serde_json::json!({
            "appid": config.app_id,
            "mchid": config.mch_id,
            "description": order.description,
            "out_trade_no": order.id,
            "notify_url": config.notify_url,
            "amount": {
                "total": order.amount,
                "currency": order.currency.as_str(),
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Gateway {
                gateway: "wechat".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CoreError::Gateway {
            gateway: "wechat".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("WeChat Pay API error: status={status}, body={text}");
            let message = serde_json::from_str::<WechatErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(CoreError::Gateway {
                gateway: "wechat".to_string(),
                message,
            });
        }

        let charge: WechatChargeResponse = serde_json::from_str(&text).map_err(|e| {
            CoreError::Gateway {
                gateway: "wechat".to_string(),
                message: format!("unexpected charge response: {e}"),
            }
        })?;

        Ok(ChargeInit {
            provider_ref: order.id.clone(),
            init_data: serde_json::json!({ "qr_code": charge.code_url }),
        })
    }

    async fn verify_notification(&self, payload: &[u8], headers: &RawHeaders) -> bool {
        let Some(config) = &self.config else {
            // Mock mode accepts everything; there is no key to check against.
            return true;
        };

        let (Some(timestamp), Some(nonce), Some(signature)) = (
            headers.get("wechatpay-timestamp"),
            headers.get("wechatpay-nonce"),
            headers.get("wechatpay-signature"),
        ) else {
            return false;
        };

        let message = format!(
            "{}\n{}\n{}\n",
            timestamp,
            nonce,
            String::from_utf8_lossy(payload)
        );
        let expected = hmac_sha256_hex(&config.api_v3_key, &message);
        constant_time_eq(signature, &expected)
    }

    fn parse_notification(
        &self,
        payload: &[u8],
        _headers: &RawHeaders,
    ) -> CoreResult<NotificationEvent> {
        let raw: WechatNotification = serde_json::from_slice(payload)
            .map_err(|e| CoreError::NotificationParseError(e.to_string()))?;

        let outcome = match raw.event_type.as_str() {
            "TRANSACTION.SUCCESS" => PaymentOutcome::Succeeded,
            "TRANSACTION.CLOSED" | "TRANSACTION.FAIL" => PaymentOutcome::Failed,
            other => {
                return Err(CoreError::NotificationParseError(format!(
                    "unhandled WeChat event type: {other}"
                )))
            }
        };

        Ok(NotificationEvent {
            order_id: raw.resource.out_trade_no,
            outcome,
            transaction_id: raw.resource.transaction_id,
            gateway: "wechat".to_string(),
        })
    }

    #[instrument(skip(self, order, reason), fields(order_id = %order.id))]
    async fn refund(&self, order: &Order, amount: i64, reason: &str) -> CoreResult<String> {
        let Some(config) = &self.config else {
            debug!("mock WeChat refund");
            return Ok(format!("wechat-mock-refund-{}", order.id));
        };

        let url = format!("{}/v3/refund/domestic/refunds", config.api_base_url);
        let body = serde_json::json!({
            "out_trade_no": order.id,
            "out_refund_no": Uuid::new_v4().to_string(),
            "reason": reason,
            "amount": {
                "refund": amount,
                "total": order.amount,
                "currency": order.currency.as_str(),
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Gateway {
                gateway: "wechat".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CoreError::Gateway {
            gateway: "wechat".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("WeChat Pay refund error: status={status}, body={text}");
            return Err(CoreError::Gateway {
                gateway: "wechat".to_string(),
                message: format!("refund failed: HTTP {status}"),
            });
        }

        let refund: WechatRefundResponse = serde_json::from_str(&text).map_err(|e| {
            CoreError::Gateway {
                gateway: "wechat".to_string(),
                message: format!("unexpected refund response: {e}"),
            }
        })?;
        Ok(refund.refund_id)
    }

    fn success_ack(&self) -> WebhookAck {
        WebhookAck::json(200, serde_json::json!({ "code": "SUCCESS", "message": "OK" }))
    }

    fn failure_ack(&self) -> WebhookAck {
        // Non-2xx tells WeChat Pay to redeliver later.
        WebhookAck::json(
            401,
            serde_json::json!({ "code": "FAIL", "message": "signature verification failed" }),
        )
    }
}
