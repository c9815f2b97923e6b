//! 支付领域枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx，存储为小写 varchar）和 JSON（serde）序列化。
//! 状态类枚举提供 `can_transition_to`，状态只允许向前推进。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 支付订单状态
///
/// `created → pending → completed | failed | cancelled`，后三者为终态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum OrderStatus {
    /// 已在网关创建，等待用户支付
    #[default]
    Created,
    /// 用户已发起支付，等待网关确认
    Pending,
    /// 支付已验证
    Completed,
    /// 支付失败
    Failed,
    /// 用户取消
    Cancelled,
}

impl OrderStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// 是否允许迁移到目标状态
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        match self {
            Self::Created => matches!(
                next,
                Self::Pending | Self::Completed | Self::Failed | Self::Cancelled
            ),
            Self::Pending => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Free,
    Paid,
    Admin,
}

impl UserRole {
    /// 支付成功后的角色：免费用户升级为付费，管理员保持不变
    pub fn after_payment(self) -> UserRole {
        match self {
            Self::Free | Self::Paid => Self::Paid,
            Self::Admin => Self::Admin,
        }
    }
}

/// 用户退款资格状态
///
/// `not_eligible → eligible → processing → issued`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    NotEligible,
    Eligible,
    Processing,
    Issued,
}

impl RefundStatus {
    /// 只允许沿固定顺序前进一步
    pub fn can_transition_to(self, next: RefundStatus) -> bool {
        matches!(
            (self, next),
            (Self::NotEligible, Self::Eligible)
                | (Self::Eligible, Self::Processing)
                | (Self::Processing, Self::Issued)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotEligible => "not_eligible",
            Self::Eligible => "eligible",
            Self::Processing => "processing",
            Self::Issued => "issued",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 推荐记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ReferralStatus {
    Pending,
    Completed,
    Failed,
}

/// 退款单状态
///
/// `requested → approved → processing → processed`，任一非终态都可被拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RefundRecordStatus {
    Requested,
    Approved,
    Processing,
    Processed,
    Rejected,
}

impl RefundRecordStatus {
    /// 是否仍占用用户的“进行中退款”名额
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Processed | Self::Rejected)
    }

    pub fn can_transition_to(self, next: RefundRecordStatus) -> bool {
        match self {
            Self::Requested => matches!(next, Self::Approved | Self::Rejected),
            Self::Approved => matches!(next, Self::Processing | Self::Rejected),
            Self::Processing => matches!(next, Self::Processed | Self::Rejected),
            Self::Processed | Self::Rejected => false,
        }
    }
}

/// 审计动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum AuditAction {
    /// 支付验证通过并完成订单
    PaymentVerified,
    /// 签名校验失败
    PaymentRejected,
    /// 网关数据与订单不一致
    PaymentIntegrityFailure,
    /// 支付处理失败（未扣款、事务失败或超时）
    PaymentFailed,
    /// 推荐奖励已发放
    ReferralRewarded,
    /// 推荐码无效、自我推荐或重复推荐，奖励被跳过
    ReferralSkipped,
    /// 推荐人达到退款里程碑
    ReferralMilestone,
    /// 用户提交退款申请
    RefundRequested,
    /// 订单被标记为失败或取消
    OrderFailed,
}
