//! 通知类型定义

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentSuccess,
    ReferralMilestone,
    RefundProcessing,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PaymentSuccess => "payment_success",
            Self::ReferralMilestone => "referral_milestone",
            Self::RefundProcessing => "refund_processing",
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    InApp,
}

/// 待发送的通知
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub recipient_name: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub channels: Vec<ChannelKind>,
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user: &User,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            user_id: user.id,
            email: user.email.clone(),
            recipient_name: user.name.clone(),
            kind,
            title: title.into(),
            body: body.into(),
            channels: vec![ChannelKind::Email, ChannelKind::InApp],
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = channels;
        self
    }
}

/// 以最小货币单位表示的金额格式化为两位小数
pub fn format_amount(amount: i64, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{} {}.{:02}", sign, currency, abs / 100, abs % 100)
}

/// 业务通知构建器
pub struct NotificationBuilder;

impl NotificationBuilder {
    pub fn payment_success(user: &User, amount: i64, currency: &str) -> Notification {
        Notification::new(
            user,
            NotificationKind::PaymentSuccess,
            "支付成功",
            format!(
                "{}，您已成功支付 {}，付费内容已解锁。",
                user.name,
                format_amount(amount, currency)
            ),
        )
        .with_data("amount", serde_json::json!(amount))
        .with_data("currency", serde_json::json!(currency))
    }

    pub fn referral_milestone(user: &User, referral_count: i32) -> Notification {
        Notification::new(
            user,
            NotificationKind::ReferralMilestone,
            "恭喜达成推荐里程碑",
            format!(
                "{}，您已成功推荐 {} 位好友，现在可以申请全额退款。",
                user.name, referral_count
            ),
        )
        .with_data("referralCount", serde_json::json!(referral_count))
    }

    pub fn refund_processing(user: &User, amount: i64, currency: &str) -> Notification {
        Notification::new(
            user,
            NotificationKind::RefundProcessing,
            "退款处理中",
            format!(
                "{}，您的退款申请已受理，金额 {} 将原路退回。",
                user.name,
                format_amount(amount, currency)
            ),
        )
        .with_data("amount", serde_json::json!(amount))
        .with_data("currency", serde_json::json!(currency))
    }
}

/// 单渠道发送结果
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl ChannelResult {
    pub fn success(channel: ChannelKind, message_id: impl Into<String>) -> Self {
        Self {
            channel,
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// 一次通知的整体发送结果
#[derive(Debug, Clone)]
pub struct NotificationResult {
    pub notification_id: Uuid,
    pub channel_results: Vec<ChannelResult>,
}

impl NotificationResult {
    pub fn success_count(&self) -> usize {
        self.channel_results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.channel_results.len() - self.success_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(49_900, "INR"), "INR 499.00");
        assert_eq!(format_amount(499, "INR"), "INR 4.99");
        assert_eq!(format_amount(5, "USD"), "USD 0.05");
        assert_eq!(format_amount(-150, "INR"), "-INR 1.50");
    }

    #[test]
    fn test_builders() {
        let user = User::new("a@studyhub.test", "Asha", "AB12CD");

        let n = NotificationBuilder::referral_milestone(&user, 20);
        assert_eq!(n.kind, NotificationKind::ReferralMilestone);
        assert_eq!(n.user_id, user.id);
        assert!(n.body.contains("20"));
        assert_eq!(n.data["referralCount"], serde_json::json!(20));

        let n = NotificationBuilder::payment_success(&user, 49_900, "INR");
        assert!(n.body.contains("INR 499.00"));
        assert_eq!(n.channels, vec![ChannelKind::Email, ChannelKind::InApp]);
    }

    #[test]
    fn test_result_counts() {
        let result = NotificationResult {
            notification_id: Uuid::now_v7(),
            channel_results: vec![
                ChannelResult::success(ChannelKind::Email, "m1"),
                ChannelResult::failed(ChannelKind::InApp, "db down"),
            ],
        };
        assert_eq!(result.success_count(), 1);
        assert_eq!(result.failure_count(), 1);
        assert!(!result.all_succeeded());
    }
}
