//! 用户实体（仅包含支付与推荐相关字段）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{RefundStatus, UserRole};

/// 用户
///
/// 账号注册与登录由外部服务负责，这里只关心角色、推荐计数与退款资格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    /// 用户自己的推荐码（唯一）
    pub referral_code: String,
    /// 归因到的推荐码
    #[sqlx(default)]
    pub referred_by: Option<String>,
    /// 成功推荐人数，只增不减
    pub total_referrals: i32,
    /// 累计推荐收益（最小货币单位），只增不减
    pub referral_earnings: i64,
    pub refund_eligible: bool,
    pub refund_status: RefundStatus,
    #[sqlx(default)]
    pub payment_id: Option<String>,
    #[sqlx(default)]
    pub payment_amount: Option<i64>,
    #[sqlx(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// 构造一个未付费的新用户（测试与种子数据使用）
    pub fn new(email: impl Into<String>, name: impl Into<String>, referral_code: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            email: email.into(),
            name: name.into(),
            role: UserRole::Free,
            referral_code: referral_code.into(),
            referred_by: None,
            total_referrals: 0,
            referral_earnings: 0,
            refund_eligible: false,
            refund_status: RefundStatus::NotEligible,
            payment_id: None,
            payment_amount: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.role, UserRole::Paid | UserRole::Admin) && self.payment_id.is_some()
    }
}

/// 支付成功后写入用户的付款信息
#[derive(Debug, Clone)]
pub struct UserPaymentRecord {
    pub payment_id: String,
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
}
