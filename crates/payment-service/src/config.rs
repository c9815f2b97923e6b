//! 支付服务配置
//!
//! 对应配置文件中的 `gateway`、`payment`、`reward`、`notification` 段，
//! 通过 `studyhub_shared::config::load_section` 读取，缺失时使用默认值。

use serde::Deserialize;
use std::time::Duration;

use studyhub_shared::config::{ConfigError, load_section};

pub use crate::policy::RewardConfig;

const DEFAULT_KEY_SECRET: &str = "rzp_test_secret";
const DEFAULT_WEBHOOK_SECRET: &str = "rzp_webhook_secret";

/// 支付网关配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// 公开的 key id，会返回给前端用于拉起支付
    pub key_id: String,
    /// 回调签名与 API 鉴权使用的密钥
    pub key_secret: String,
    /// Webhook 签名密钥
    pub webhook_secret: String,
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.razorpay.com/v1".to_string(),
            key_id: "rzp_test_key".to_string(),
            key_secret: DEFAULT_KEY_SECRET.to_string(),
            webhook_secret: DEFAULT_WEBHOOK_SECRET.to_string(),
            timeout_seconds: 10,
        }
    }
}

impl GatewayConfig {
    /// 任一签名密钥仍为内置默认值
    pub fn uses_default_secrets(&self) -> bool {
        self.key_secret == DEFAULT_KEY_SECRET || self.webhook_secret == DEFAULT_WEBHOOK_SECRET
    }
}

/// 下单与验证流程配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// 请求未指定币种时使用
    pub default_currency: String,
    /// 单笔订单金额上限（最小货币单位）
    pub max_amount: i64,
    /// 验证 / 退款事务超时
    pub transaction_timeout_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            default_currency: "INR".to_string(),
            max_amount: 10_000_000,
            transaction_timeout_ms: 5_000,
        }
    }
}

impl PaymentConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

/// 通知配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 邮件服务 HTTP 端点，未配置时邮件渠道只记录日志
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
    pub from_address: String,
    pub from_name: String,
    /// 是否写入站内通知表
    pub in_app_enabled: bool,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            mail_endpoint: None,
            mail_api_key: None,
            from_address: "noreply@studyhub.app".to_string(),
            from_name: "StudyHub".to_string(),
            in_app_enabled: true,
            timeout_ms: 5_000,
        }
    }
}

/// 支付服务完整配置
#[derive(Debug, Clone, Default)]
pub struct PaymentSettings {
    pub gateway: GatewayConfig,
    pub payment: PaymentConfig,
    pub reward: RewardConfig,
    pub notification: NotificationConfig,
}

impl PaymentSettings {
    /// 按服务名加载各配置段
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            gateway: load_section(service_name, "gateway")?,
            payment: load_section(service_name, "payment")?,
            reward: load_section(service_name, "reward")?,
            notification: load_section(service_name, "notification")?,
        })
    }
}
