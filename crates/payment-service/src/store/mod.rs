//! 事务化存储抽象
//!
//! `PaymentStore` 提供事务外的读取与单条写入，`PaymentTx` 表示一个进行中的事务：
//! 行锁、原子递增与条件更新都只在事务内出现。
//!
//! 事务对象被 drop 而未 `commit` 时，所有写入回滚。
//! 持有事务期间不要再调用 `PaymentStore` 上的方法，内存实现会因此死锁。

mod memory;
mod postgres;

pub use memory::{FailPoint, MemoryPaymentStore, MemoryPaymentTx};
pub use postgres::{PgPaymentStore, PgPaymentTx};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AuditLogEntry, NewAuditEntry, NewPaymentOrder, NewReferral, NewRefund, OrderStatus,
    PaymentOrder, Referral, Refund, RefundStatus, User, UserPaymentRecord,
};

/// 订单状态更新
#[derive(Debug, Clone)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
    pub gateway_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl OrderStatusUpdate {
    pub fn completed(payment_id: impl Into<String>, verified_at: DateTime<Utc>) -> Self {
        Self {
            status: OrderStatus::Completed,
            gateway_payment_id: Some(payment_id.into()),
            failure_reason: None,
            verified_at: Some(verified_at),
        }
    }

    pub fn closed(status: OrderStatus, reason: Option<String>) -> Self {
        Self {
            status,
            gateway_payment_id: None,
            failure_reason: reason,
            verified_at: None,
        }
    }
}

/// 存储入口
#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    type Tx: PaymentTx;

    /// 开启事务
    async fn begin(&self) -> Result<Self::Tx>;

    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder>;

    async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>>;

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>>;

    /// 推荐人名下最近的推荐记录
    async fn list_referrals_by_referrer(&self, referrer_id: Uuid, limit: i64) -> Result<Vec<Referral>>;

    async fn find_active_refund(&self, user_id: Uuid) -> Result<Option<Refund>>;

    /// 事务外追加审计（失败路径的尽力记录）
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry>;
}

/// 进行中的事务
#[async_trait]
pub trait PaymentTx: Send + Sized {
    /// 按网关订单号加行锁读取订单
    async fn lock_order(&mut self, gateway_order_id: &str) -> Result<Option<PaymentOrder>>;

    async fn update_order_status(&mut self, order_id: Uuid, update: OrderStatusUpdate) -> Result<PaymentOrder>;

    /// 加行锁读取用户
    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>>;

    /// 写入付款信息并升级角色（管理员保持不变）
    async fn record_user_payment(&mut self, user_id: Uuid, payment: UserPaymentRecord) -> Result<User>;

    async fn find_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>>;

    /// 仅当 referred_by 为空时写入，返回是否写入
    async fn set_referred_by_if_empty(&mut self, user_id: Uuid, code: &str) -> Result<bool>;

    /// 写入 completed 推荐记录；同一对用户已有 completed 记录时返回 None
    async fn insert_completed_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>>;

    /// 原子递增推荐人数与收益，返回递增后的推荐人
    async fn increment_referral_stats(&mut self, referrer_id: Uuid, reward: i64) -> Result<User>;

    /// 仅当尚未获得资格时授予退款资格，返回是否由本次调用授予
    async fn grant_refund_eligibility(&mut self, user_id: Uuid) -> Result<bool>;

    async fn has_active_refund(&mut self, user_id: Uuid) -> Result<bool>;

    async fn insert_refund(&mut self, refund: NewRefund) -> Result<Refund>;

    /// 条件推进退款状态（from → to），返回是否推进
    async fn advance_refund_status(
        &mut self,
        user_id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
    ) -> Result<bool>;

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry>;

    async fn commit(self) -> Result<()>;
}
