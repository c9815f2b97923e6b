//! 服务层数据传输对象

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PaymentOrder, Referral, Refund, RefundStatus};

/// 下单参数
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub user_id: Uuid,
    pub amount: i64,
    /// 未指定时使用配置的默认币种
    pub currency: Option<String>,
    pub referral_code: Option<String>,
}

/// 下单结果，前端据此拉起网关支付
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub key_id: String,
}

/// 客户端回传的支付回调
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// 推荐处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferralResult {
    /// 订单未携带推荐码
    NotApplicable,
    #[serde(rename_all = "camelCase")]
    Rewarded {
        referrer_id: Uuid,
        reward_amount: i64,
        total_referrals: i32,
        milestone_reached: bool,
    },
    Skipped { reason: String },
}

impl ReferralResult {
    pub fn is_rewarded(&self) -> bool {
        matches!(self, Self::Rewarded { .. })
    }

    /// 本次支付是否使推荐人新获得退款资格
    pub fn milestone_reached(&self) -> bool {
        matches!(
            self,
            Self::Rewarded {
                milestone_reached: true,
                ..
            }
        )
    }
}

/// 验证成功的回执
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub order: PaymentOrder,
    pub referral: ReferralResult,
}

/// 支付验证结果
///
/// 重复回调不是错误，以 `AlreadyProcessed` 返回已存储的订单
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    Completed(PaymentReceipt),
    AlreadyProcessed(PaymentOrder),
}

impl VerificationOutcome {
    pub fn order(&self) -> &PaymentOrder {
        match self {
            Self::Completed(receipt) => &receipt.order,
            Self::AlreadyProcessed(order) => order,
        }
    }

    pub fn is_already_processed(&self) -> bool {
        matches!(self, Self::AlreadyProcessed(_))
    }

    pub fn referral_processed(&self) -> bool {
        match self {
            Self::Completed(receipt) => receipt.referral.is_rewarded(),
            Self::AlreadyProcessed(_) => false,
        }
    }

    pub fn milestone_reached(&self) -> bool {
        match self {
            Self::Completed(receipt) => receipt.referral.milestone_reached(),
            Self::AlreadyProcessed(_) => false,
        }
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::AlreadyProcessed(_) => "already_processed",
        }
    }
}

/// 推荐概览
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub referral_code: String,
    pub total_referrals: i32,
    pub referral_earnings: i64,
    pub refund_eligible: bool,
    pub refund_status: RefundStatus,
    /// 距离退款资格还差的推荐数
    pub remaining_for_refund: i32,
    pub milestone: i32,
    pub recent_referrals: Vec<Referral>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_refund: Option<Refund>,
}
