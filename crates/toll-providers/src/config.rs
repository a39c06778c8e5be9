//! # Provider Configuration
//!
//! All credentials come from environment variables. A provider with
//! incomplete credentials is not an error: it registers in mock mode so
//! the reference deployment runs end to end without any secrets.

use std::env;
use tracing::info;

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// WeChat Pay credentials.
#[derive(Debug, Clone)]
pub struct WechatConfig {
    pub app_id: String,
    pub mch_id: String,
    /// API v3 key, also used as the notification HMAC key.
    pub api_v3_key: String,
    pub notify_url: String,
    pub api_base_url: String,
}

impl WechatConfig {
    /// Load from environment. Returns `None` (mock mode) unless all of
    /// `WECHAT_APP_ID`, `WECHAT_MCH_ID` and `WECHAT_API_V3_KEY` are set.
    pub fn from_env() -> Option<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            app_id: env_nonempty("WECHAT_APP_ID")?,
            mch_id: env_nonempty("WECHAT_MCH_ID")?,
            api_v3_key: env_nonempty("WECHAT_API_V3_KEY")?,
            notify_url: env_nonempty("WECHAT_NOTIFY_URL")
                .unwrap_or_else(|| "http://localhost:8787/api/payment/notify/wechat".to_string()),
            api_base_url: env_nonempty("WECHAT_API_BASE_URL")
                .unwrap_or_else(|| "https://api.mch.weixin.qq.com".to_string()),
        };
        info!("WeChat Pay configured");
        Some(config)
    }
}

/// Alipay credentials.
#[derive(Debug, Clone)]
pub struct AlipayConfig {
    pub app_id: String,
    /// Key for the HMAC notification signature and request signing.
    pub sign_key: String,
    pub gateway_url: String,
    pub notify_url: String,
}

impl AlipayConfig {
    /// Load from environment. Returns `None` (mock mode) unless both
    /// `ALIPAY_APP_ID` and `ALIPAY_SIGN_KEY` are set.
    pub fn from_env() -> Option<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            app_id: env_nonempty("ALIPAY_APP_ID")?,
            sign_key: env_nonempty("ALIPAY_SIGN_KEY")?,
            gateway_url: env_nonempty("ALIPAY_GATEWAY")
                .unwrap_or_else(|| "https://openapi.alipay.com/gateway.do".to_string()),
            notify_url: env_nonempty("ALIPAY_NOTIFY_URL")
                .unwrap_or_else(|| "http://localhost:8787/api/payment/notify/alipay".to_string()),
        };
        info!("Alipay configured");
        Some(config)
    }
}
