//! 推荐与退款实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{RefundRecordStatus, ReferralStatus};

/// 推荐记录
///
/// 同一 (推荐人, 被推荐人) 至多一条 completed 记录，奖励金额写入后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub reward_amount: i64,
    /// 触发奖励的订单
    pub order_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// 新建推荐记录参数（总是以 completed 状态写入）
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    pub referral_code: String,
    pub reward_amount: i64,
    pub order_id: Uuid,
}

impl NewReferral {
    pub fn into_referral(self, now: DateTime<Utc>) -> Referral {
        Referral {
            id: Uuid::now_v7(),
            referrer_id: self.referrer_id,
            referred_user_id: self.referred_user_id,
            referral_code: self.referral_code,
            status: ReferralStatus::Completed,
            reward_amount: self.reward_amount,
            order_id: self.order_id,
            created_at: now,
            completed_at: Some(now),
        }
    }
}

/// 退款方式：原路退回
pub const REFUND_METHOD_ORIGINAL_PAYMENT: &str = "original_payment";

/// 退款单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: RefundRecordStatus,
    pub method: String,
    /// 申请时的推荐人数快照
    pub referral_count_snapshot: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建退款单参数
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub user_id: Uuid,
    pub amount: i64,
    pub status: RefundRecordStatus,
    pub method: String,
    pub referral_count_snapshot: i32,
}

impl NewRefund {
    pub fn into_refund(self, now: DateTime<Utc>) -> Refund {
        Refund {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            amount: self.amount,
            status: self.status,
            method: self.method,
            referral_count_snapshot: self.referral_count_snapshot,
            created_at: now,
            updated_at: now,
        }
    }
}
