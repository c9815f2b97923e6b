//! 支付订单实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::OrderStatus;

/// 支付订单
///
/// 一次支付尝试在本系统内的记录，与网关订单一一对应，永不删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 网关侧订单号（唯一）
    pub gateway_order_id: String,
    /// 金额（最小货币单位）
    pub amount: i64,
    pub currency: String,
    /// 商户侧收据号（唯一）
    pub receipt: String,
    pub status: OrderStatus,
    /// 下单时填写的推荐码
    #[sqlx(default)]
    pub referral_code: Option<String>,
    #[sqlx(default)]
    pub gateway_payment_id: Option<String>,
    #[sqlx(default)]
    pub failure_reason: Option<String>,
    #[sqlx(default)]
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 新建订单参数
#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub user_id: Uuid,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub referral_code: Option<String>,
}

impl NewPaymentOrder {
    /// 生成初始状态为 `created` 的订单实体
    pub fn into_order(self, now: DateTime<Utc>) -> PaymentOrder {
        PaymentOrder {
            id: Uuid::now_v7(),
            user_id: self.user_id,
            gateway_order_id: self.gateway_order_id,
            amount: self.amount,
            currency: self.currency,
            receipt: self.receipt,
            status: OrderStatus::Created,
            referral_code: self.referral_code,
            gateway_payment_id: None,
            failure_reason: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 生成收据号：`rcpt_` + 32 位十六进制，满足网关 40 字符上限
pub fn generate_receipt() -> String {
    format!("rcpt_{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_format() {
        let receipt = generate_receipt();
        assert!(receipt.starts_with("rcpt_"));
        assert!(receipt.len() <= 40);
        assert_ne!(receipt, generate_receipt());
    }

    #[test]
    fn test_new_order_starts_created() {
        let order = NewPaymentOrder {
            user_id: Uuid::new_v4(),
            gateway_order_id: "order_1".to_string(),
            amount: 49_900,
            currency: "INR".to_string(),
            receipt: generate_receipt(),
            referral_code: Some("AB12CD".to_string()),
        }
        .into_order(Utc::now());

        assert_eq!(order.status, OrderStatus::Created);
        assert!(!order.is_terminal());
        assert!(order.gateway_payment_id.is_none());
        assert_eq!(order.created_at, order.updated_at);
    }
}
