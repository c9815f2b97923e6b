//! 响应 DTO 定义

use serde::{Deserialize, Serialize};

use studyhub_payment::{PaymentOrder, Refund, VerificationOutcome};

/// API 统一响应
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应，自定义提示
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 支付验证响应
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub already_processed: bool,
    pub referral_processed: bool,
    pub milestone_reached: bool,
    pub order: PaymentOrder,
}

impl From<VerificationOutcome> for VerifyPaymentResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            already_processed: outcome.is_already_processed(),
            referral_processed: outcome.referral_processed(),
            milestone_reached: outcome.milestone_reached(),
            order: outcome.order().clone(),
        }
    }
}

/// 退款申请响应
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub refund: Refund,
}

/// Webhook 确认
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_processed: Option<bool>,
}
