//! # Alipay Gateway
//!
//! Page-pay flow. Notifications arrive form-encoded; `trade_status` maps to
//! the ledger's outcome and the `sign` field is checked as HMAC-SHA256 over
//! the canonical sorted parameter string (stand-in for the RSA2 scheme,
//! which is pluggable). Alipay treats any response body other than the
//! literal `success` as "retry me", so both acks are HTTP 200.

use crate::config::AlipayConfig;
use crate::sig::{constant_time_eq, hmac_sha256_hex};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use toll_core::{
    ChargeInit, CoreError, CoreResult, NotificationEvent, Order, PaymentGateway, PaymentOutcome,
    RawHeaders, WebhookAck,
};
use tracing::{debug, info, instrument, warn};

pub struct AlipayGateway {
    config: Option<AlipayConfig>,
    client: Client,
}

impl AlipayGateway {
    pub fn new(config: Option<AlipayConfig>) -> Self {
        if config.is_none() {
            info!("Alipay not configured, using mock mode");
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(AlipayConfig::from_env())
    }

    pub fn is_mock(&self) -> bool {
        self.config.is_none()
    }

    /// Decimal string with the currency's minor-unit precision,
    /// e.g. 10000 minor CNY -> "100.00".
    fn decimal_amount(order: &Order, amount: i64) -> String {
        format!(
            "{:.prec$}",
            order.currency.from_minor_units(amount),
            prec = order.currency.decimal_places() as usize
        )
    }
}

/// Form decoding for Alipay notification bodies. The payload is attacker
/// controlled until the signature check passes, so decoding must never
/// panic: malformed escapes pass through literally, invalid UTF-8 is
/// replaced.
fn parse_form(payload: &[u8]) -> BTreeMap<String, String> {
    fn decode(s: &str) -> String {
        let unplused = s.replace('+', " ");
        String::from_utf8_lossy(&urlencoding::decode_binary(unplused.as_bytes())).into_owned()
    }

    let text = String::from_utf8_lossy(payload);
    text.split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((decode(k), decode(v)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AlipayRefundEnvelope {
    alipay_trade_refund_response: AlipayRefundResponse,
}

#[derive(Debug, Deserialize)]
struct AlipayRefundResponse {
    code: String,
    #[serde(default)]
    trade_no: Option<String>,
    #[serde(default)]
    sub_msg: Option<String>,
}

/// Extract the gateway's refund reference from a refund response body.
/// Alipay reports success as code "10000" and identifies the refunded
/// trade by its `trade_no`.
fn parse_refund_response(text: &str) -> CoreResult<String> {
    let envelope: AlipayRefundEnvelope =
        serde_json::from_str(text).map_err(|e| CoreError::Gateway {
            gateway: "alipay".to_string(),
            message: format!("unexpected refund response: {e}"),
        })?;
    let response = envelope.alipay_trade_refund_response;

    if response.code != "10000" {
        return Err(CoreError::Gateway {
            gateway: "alipay".to_string(),
            message: response
                .sub_msg
                .unwrap_or_else(|| format!("refund rejected with code {}", response.code)),
        });
    }

    response.trade_no.ok_or_else(|| CoreError::Gateway {
        gateway: "alipay".to_string(),
        message: "refund response missing trade_no".to_string(),
    })
}

/// Canonical `k=v&k=v` string over sorted keys, excluding the signature
/// fields themselves.
fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != "sign" && k.as_str() != "sign_type")
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl PaymentGateway for AlipayGateway {
    fn name(&self) -> &'static str {
        "alipay"
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_charge(&self, order: &Order) -> CoreResult<ChargeInit> {
        let Some(config) = &self.config else {
            debug!("mock Alipay charge");
            return Ok(ChargeInit {
                provider_ref: format!("alipay-mock-{}", order.id),
                init_data: serde_json::json!({
                    "payment_url": format!("alipay://pay/mock/{}", order.id),
                    "mock": true,
                }),
            });
        };

        let biz_content = serde_json::json!({
            "out_trade_no": order.id,
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "total_amount": Self::decimal_amount(order, order.amount),
            "subject": order.description,
        })
        .to_string();

        let form = [
            ("app_id", config.app_id.as_str()),
            ("method", "alipay.trade.page.pay"),
            ("notify_url", config.notify_url.as_str()),
            ("biz_content", biz_content.as_str()),
        ];

        let response = self
            .client
            .post(&config.gateway_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::Gateway {
                gateway: "alipay".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CoreError::Gateway {
            gateway: "alipay".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Alipay API error: status={status}");
            return Err(CoreError::Gateway {
                gateway: "alipay".to_string(),
                message: format!("HTTP {status}"),
            });
        }

        // The gateway answers with the hosted payment page content/URL.
        Ok(ChargeInit {
            provider_ref: order.id.clone(),
            init_data: serde_json::json!({ "payment_url": text }),
        })
    }

    async fn verify_notification(&self, payload: &[u8], _headers: &RawHeaders) -> bool {
        let Some(config) = &self.config else {
            return true;
        };

        let params = parse_form(payload);
        let Some(sign) = params.get("sign") else {
            return false;
        };
        let expected = hmac_sha256_hex(&config.sign_key, &canonical_string(&params));
        constant_time_eq(sign, &expected)
    }

    fn parse_notification(
        &self,
        payload: &[u8],
        _headers: &RawHeaders,
    ) -> CoreResult<NotificationEvent> {
        let params = parse_form(payload);

        let order_id = params
            .get("out_trade_no")
            .cloned()
            .ok_or_else(|| CoreError::NotificationParseError("missing out_trade_no".to_string()))?;
        let trade_status = params
            .get("trade_status")
            .map(String::as_str)
            .ok_or_else(|| CoreError::NotificationParseError("missing trade_status".to_string()))?;

        let outcome = match trade_status {
            "TRADE_SUCCESS" | "TRADE_FINISHED" => PaymentOutcome::Succeeded,
            "TRADE_CLOSED" => PaymentOutcome::Failed,
            other => {
                return Err(CoreError::NotificationParseError(format!(
                    "unhandled Alipay trade status: {other}"
                )))
            }
        };

        Ok(NotificationEvent {
            order_id,
            outcome,
            transaction_id: params.get("trade_no").cloned(),
            gateway: "alipay".to_string(),
        })
    }

    #[instrument(skip(self, order, reason), fields(order_id = %order.id))]
    async fn refund(&self, order: &Order, amount: i64, reason: &str) -> CoreResult<String> {
        let Some(config) = &self.config else {
            debug!("mock Alipay refund");
            return Ok(format!("alipay-mock-refund-{}", order.id));
        };

        let biz_content = serde_json::json!({
            "out_trade_no": order.id,
            "refund_amount": Self::decimal_amount(order, amount),
            "refund_reason": reason,
        })
        .to_string();

        let form = [
            ("app_id", config.app_id.as_str()),
            ("method", "alipay.trade.refund"),
            ("biz_content", biz_content.as_str()),
        ];

        let response = self
            .client
            .post(&config.gateway_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::Gateway {
                gateway: "alipay".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CoreError::Gateway {
            gateway: "alipay".to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            warn!("Alipay refund error: status={status}");
            return Err(CoreError::Gateway {
                gateway: "alipay".to_string(),
                message: format!("refund failed: HTTP {status}"),
            });
        }

        parse_refund_response(&text)
    }

    fn success_ack(&self) -> WebhookAck {
        // Alipay stops retrying only on the literal body "success".
        WebhookAck::text(200, "success")
    }

    fn failure_ack(&self) -> WebhookAck {
        WebhookAck::text(200, "fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use toll_core::Currency;

    fn configured() -> AlipayGateway {
        AlipayGateway::new(Some(AlipayConfig {
            app_id: "2021000000000000".to_string(),
            sign_key: "alipay_key".to_string(),
            gateway_url: "http://localhost:1".to_string(),
            notify_url: "http://localhost/notify/alipay".to_string(),
        }))
    }

    fn signed_body(config_key: &str, order_id: &str, trade_status: &str) -> Vec<u8> {
        let mut params = BTreeMap::new();
        params.insert("out_trade_no".to_string(), order_id.to_string());
        params.insert("trade_status".to_string(), trade_status.to_string());
        params.insert("trade_no".to_string(), "2024112200001".to_string());
        let sign = hmac_sha256_hex(config_key, &canonical_string(&params));

        let mut body: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        body.push(format!("sign={sign}"));
        body.push("sign_type=HMAC-SHA256".to_string());
        body.join("&").into_bytes()
    }

    #[test]
    fn test_parse_form_decoding() {
        let parsed = parse_form(b"a=1&subject=Hello+World&pct=%2F%41");
        assert_eq!(parsed["a"], "1");
        assert_eq!(parsed["subject"], "Hello World");
        assert_eq!(parsed["pct"], "/A");
    }

    #[test]
    fn test_parse_form_hostile_escapes_never_panic() {
        // A truncated escape followed by a multibyte character, straight
        // off the wire before any signature check.
        let event = AlipayGateway::new(None)
            .parse_notification(
                "out_trade_no=%a\u{e9}&trade_status=TRADE_SUCCESS".as_bytes(),
                &RawHeaders::new(),
            )
            .unwrap();
        // The malformed escape passes through literally.
        assert_eq!(event.order_id, "%a\u{e9}");

        // Escapes decoding to invalid UTF-8 and bare '%' at end of input.
        let parsed = parse_form(b"k=%ff%fe&t=%");
        assert_eq!(parsed["t"], "%");
        assert!(!parsed["k"].is_empty());

        // Raw invalid UTF-8 in the body itself.
        let parsed = parse_form(b"out_trade_no=\xf0\x28\x8c\x28&trade_status=TRADE_CLOSED");
        assert_eq!(parsed["trade_status"], "TRADE_CLOSED");
    }

    #[tokio::test]
    async fn test_verify_notification() {
        let gw = configured();
        let body = signed_body("alipay_key", "ord-1", "TRADE_SUCCESS");
        assert!(gw.verify_notification(&body, &RawHeaders::new()).await);

        // Wrong key produces a different signature.
        let forged = signed_body("wrong_key", "ord-1", "TRADE_SUCCESS");
        assert!(!gw.verify_notification(&forged, &RawHeaders::new()).await);

        // Missing sign field fails outright.
        assert!(
            !gw.verify_notification(b"out_trade_no=ord-1&trade_status=TRADE_SUCCESS", &RawHeaders::new())
                .await
        );
    }

    #[test]
    fn test_parse_notification_outcomes() {
        let gw = AlipayGateway::new(None);

        let success = gw
            .parse_notification(
                b"out_trade_no=ord-1&trade_status=TRADE_SUCCESS&trade_no=2024112200001",
                &RawHeaders::new(),
            )
            .unwrap();
        assert_eq!(success.order_id, "ord-1");
        assert_eq!(success.outcome, PaymentOutcome::Succeeded);
        assert_eq!(success.transaction_id.as_deref(), Some("2024112200001"));

        let finished = gw
            .parse_notification(
                b"out_trade_no=ord-1&trade_status=TRADE_FINISHED",
                &RawHeaders::new(),
            )
            .unwrap();
        assert_eq!(finished.outcome, PaymentOutcome::Succeeded);

        let closed = gw
            .parse_notification(
                b"out_trade_no=ord-1&trade_status=TRADE_CLOSED",
                &RawHeaders::new(),
            )
            .unwrap();
        assert_eq!(closed.outcome, PaymentOutcome::Failed);

        assert!(gw
            .parse_notification(b"out_trade_no=ord-1&trade_status=WAIT_BUYER_PAY", &RawHeaders::new())
            .is_err());
        assert!(gw
            .parse_notification(b"trade_status=TRADE_SUCCESS", &RawHeaders::new())
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_mode_deterministic() {
        let gw = AlipayGateway::new(None);
        assert!(gw.is_mock());

        let order = Order::new("u", 10000, Currency::CNY, "Payment", "alipay", Utc::now());
        let init = gw.create_charge(&order).await.unwrap();
        assert_eq!(
            init.init_data["payment_url"],
            format!("alipay://pay/mock/{}", order.id)
        );
    }

    #[test]
    fn test_acks_both_http_200() {
        let gw = AlipayGateway::new(None);
        assert_eq!(gw.success_ack(), WebhookAck::text(200, "success"));
        assert_eq!(gw.failure_ack(), WebhookAck::text(200, "fail"));
    }

    #[test]
    fn test_refund_response_reference() {
        let reference = parse_refund_response(
            r#"{"alipay_trade_refund_response":{"code":"10000","msg":"Success","trade_no":"2024112222001"}}"#,
        )
        .unwrap();
        assert_eq!(reference, "2024112222001");

        // A business failure carries the gateway's message.
        let err = parse_refund_response(
            r#"{"alipay_trade_refund_response":{"code":"40004","sub_msg":"trade not exist"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Gateway { .. }));
        assert!(err.to_string().contains("trade not exist"));

        assert!(parse_refund_response("not json").is_err());
    }

    #[test]
    fn test_decimal_amount_formatting() {
        let order = Order::new("u", 10000, Currency::CNY, "Payment", "alipay", Utc::now());
        assert_eq!(AlipayGateway::decimal_amount(&order, 10000), "100.00");
        assert_eq!(AlipayGateway::decimal_amount(&order, 2550), "25.50");

        let jpy = Order::new("u", 500, Currency::JPY, "Payment", "alipay", Utc::now());
        assert_eq!(AlipayGateway::decimal_amount(&jpy, 500), "500");
    }
}
