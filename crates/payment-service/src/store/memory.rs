//! 内存存储实现
//!
//! 事务持有整个状态的异步互斥锁直到提交或回滚，写入落在状态副本上，
//! 提交时整体替换，因此事务之间天然串行且可以整体回滚。
//!
//! 支持在指定操作上注入一次性故障或延迟，用于验证原子性与事务超时。

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{OrderStatusUpdate, PaymentStore, PaymentTx};
use crate::error::{PaymentError, Result};
use crate::models::{
    AuditLogEntry, NewAuditEntry, NewPaymentOrder, NewReferral, NewRefund, PaymentOrder, Referral,
    ReferralStatus, Refund, RefundStatus, User, UserPaymentRecord,
};

/// 可注入故障的事务操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    LockOrder,
    UpdateOrderStatus,
    RecordUserPayment,
    InsertReferral,
    IncrementReferralStats,
    GrantRefundEligibility,
    InsertRefund,
    AdvanceRefundStatus,
    AppendAudit,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: HashMap<Uuid, PaymentOrder>,
    users: HashMap<Uuid, User>,
    referrals: Vec<Referral>,
    refunds: Vec<Refund>,
    audit_log: Vec<AuditLogEntry>,
}

impl MemoryState {
    fn order_by_gateway_id(&self, gateway_order_id: &str) -> Option<&PaymentOrder> {
        self.orders
            .values()
            .find(|o| o.gateway_order_id == gateway_order_id)
    }

    fn user_by_code(&self, code: &str) -> Option<&User> {
        self.users.values().find(|u| u.referral_code == code)
    }

    fn user_mut(&mut self, user_id: Uuid) -> Result<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or(PaymentError::UserNotFound(user_id))
    }

    fn push_audit(&mut self, entry: NewAuditEntry) -> AuditLogEntry {
        let entry = entry.into_entry(Utc::now());
        self.audit_log.push(entry.clone());
        entry
    }
}

#[derive(Default)]
struct Faults {
    fail_once: SyncMutex<Option<FailPoint>>,
    stall: SyncMutex<Option<(FailPoint, Duration)>>,
}

impl Faults {
    async fn check(&self, point: FailPoint) -> Result<()> {
        let stall = {
            let mut guard = self.stall.lock();
            match *guard {
                Some((p, duration)) if p == point => {
                    *guard = None;
                    Some(duration)
                }
                _ => None,
            }
        };
        if let Some(duration) = stall {
            tokio::time::sleep(duration).await;
        }

        let mut guard = self.fail_once.lock();
        if *guard == Some(point) {
            *guard = None;
            return Err(PaymentError::TransientStore(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

/// 内存存储
#[derive(Clone, Default)]
pub struct MemoryPaymentStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入（或覆盖）用户
    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn order(&self, gateway_order_id: &str) -> Option<PaymentOrder> {
        self.state
            .lock()
            .await
            .order_by_gateway_id(gateway_order_id)
            .cloned()
    }

    pub async fn referrals(&self) -> Vec<Referral> {
        self.state.lock().await.referrals.clone()
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.state.lock().await.refunds.clone()
    }

    pub async fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.state.lock().await.audit_log.clone()
    }

    /// 下一次执行到该操作时返回 `TransientStore`
    pub fn fail_once(&self, point: FailPoint) {
        *self.faults.fail_once.lock() = Some(point);
    }

    /// 下一次执行到该操作时先等待指定时长
    pub fn stall_once(&self, point: FailPoint, duration: Duration) {
        *self.faults.stall.lock() = Some((point, duration));
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    type Tx = MemoryPaymentTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryPaymentTx {
            guard,
            staged,
            faults: self.faults.clone(),
        })
    }

    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder> {
        let mut state = self.state.lock().await;
        if state.orders.values().any(|o| {
            o.gateway_order_id == order.gateway_order_id || o.receipt == order.receipt
        }) {
            return Err(PaymentError::Internal(format!(
                "duplicate order: {}",
                order.gateway_order_id
            )));
        }
        let order = order.into_order(Utc::now());
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>> {
        Ok(self.order(gateway_order_id).await)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.user(user_id).await)
    }

    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        Ok(self.state.lock().await.user_by_code(code).cloned())
    }

    async fn list_referrals_by_referrer(&self, referrer_id: Uuid, limit: i64) -> Result<Vec<Referral>> {
        let state = self.state.lock().await;
        let mut referrals: Vec<_> = state
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect();
        referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        referrals.truncate(limit.max(0) as usize);
        Ok(referrals)
    }

    async fn find_active_refund(&self, user_id: Uuid) -> Result<Option<Refund>> {
        let state = self.state.lock().await;
        Ok(state
            .refunds
            .iter()
            .rev()
            .find(|r| r.user_id == user_id && r.status.is_active())
            .cloned())
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        Ok(self.state.lock().await.push_audit(entry))
    }
}

/// 内存事务
pub struct MemoryPaymentTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl PaymentTx for MemoryPaymentTx {
    async fn lock_order(&mut self, gateway_order_id: &str) -> Result<Option<PaymentOrder>> {
        self.faults.check(FailPoint::LockOrder).await?;
        Ok(self.staged.order_by_gateway_id(gateway_order_id).cloned())
    }

    async fn update_order_status(&mut self, order_id: Uuid, update: OrderStatusUpdate) -> Result<PaymentOrder> {
        self.faults.check(FailPoint::UpdateOrderStatus).await?;
        let order = self
            .staged
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        order.status = update.status;
        if update.gateway_payment_id.is_some() {
            order.gateway_payment_id = update.gateway_payment_id;
        }
        if update.failure_reason.is_some() {
            order.failure_reason = update.failure_reason;
        }
        if update.verified_at.is_some() {
            order.verified_at = update.verified_at;
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.staged.users.get(&user_id).cloned())
    }

    async fn record_user_payment(&mut self, user_id: Uuid, payment: UserPaymentRecord) -> Result<User> {
        self.faults.check(FailPoint::RecordUserPayment).await?;
        let user = self.staged.user_mut(user_id)?;
        user.role = user.role.after_payment();
        user.payment_id = Some(payment.payment_id);
        user.payment_amount = Some(payment.amount);
        user.paid_at = Some(payment.paid_at);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn find_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>> {
        Ok(self.staged.user_by_code(code).cloned())
    }

    async fn set_referred_by_if_empty(&mut self, user_id: Uuid, code: &str) -> Result<bool> {
        let user = self.staged.user_mut(user_id)?;
        if user.referred_by.is_some() {
            return Ok(false);
        }
        user.referred_by = Some(code.to_string());
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_completed_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>> {
        self.faults.check(FailPoint::InsertReferral).await?;
        let duplicate = self.staged.referrals.iter().any(|r| {
            r.referrer_id == referral.referrer_id
                && r.referred_user_id == referral.referred_user_id
                && r.status == ReferralStatus::Completed
        });
        if duplicate {
            return Ok(None);
        }
        let referral = referral.into_referral(Utc::now());
        self.staged.referrals.push(referral.clone());
        Ok(Some(referral))
    }

    async fn increment_referral_stats(&mut self, referrer_id: Uuid, reward: i64) -> Result<User> {
        self.faults.check(FailPoint::IncrementReferralStats).await?;
        let user = self.staged.user_mut(referrer_id)?;
        user.total_referrals += 1;
        user.referral_earnings += reward;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn grant_refund_eligibility(&mut self, user_id: Uuid) -> Result<bool> {
        self.faults.check(FailPoint::GrantRefundEligibility).await?;
        let user = self.staged.user_mut(user_id)?;
        if user.refund_eligible || user.refund_status != RefundStatus::NotEligible {
            return Ok(false);
        }
        user.refund_eligible = true;
        user.refund_status = RefundStatus::Eligible;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn has_active_refund(&mut self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .staged
            .refunds
            .iter()
            .any(|r| r.user_id == user_id && r.status.is_active()))
    }

    async fn insert_refund(&mut self, refund: NewRefund) -> Result<Refund> {
        self.faults.check(FailPoint::InsertRefund).await?;
        let refund = refund.into_refund(Utc::now());
        self.staged.refunds.push(refund.clone());
        Ok(refund)
    }

    async fn advance_refund_status(
        &mut self,
        user_id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
    ) -> Result<bool> {
        self.faults.check(FailPoint::AdvanceRefundStatus).await?;
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let user = self.staged.user_mut(user_id)?;
        if user.refund_status != from {
            return Ok(false);
        }
        user.refund_status = to;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        self.faults.check(FailPoint::AppendAudit).await?;
        Ok(self.staged.push_audit(entry))
    }

    async fn commit(self) -> Result<()> {
        self.faults.check(FailPoint::Commit).await?;
        let Self {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, generate_receipt};

    async fn seeded() -> (MemoryPaymentStore, User, PaymentOrder) {
        let store = MemoryPaymentStore::new();
        let user = User::new("payer@studyhub.test", "Payer", "PAYER1");
        store.insert_user(user.clone()).await;
        let order = store
            .insert_order(NewPaymentOrder {
                user_id: user.id,
                gateway_order_id: "order_A".to_string(),
                amount: 499,
                currency: "INR".to_string(),
                receipt: generate_receipt(),
                referral_code: None,
            })
            .await
            .unwrap();
        (store, user, order)
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, user, order) = seeded().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.update_order_status(order.id, OrderStatusUpdate::completed("pay_1", Utc::now()))
                .await
                .unwrap();
            tx.increment_referral_stats(user.id, 49).await.unwrap();
        }

        let order = store.order("order_A").await.unwrap();
        assert!(!order.is_terminal());
        assert_eq!(store.user(user.id).await.unwrap().total_referrals, 0);
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let (store, user, order) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        tx.update_order_status(order.id, OrderStatusUpdate::completed("pay_1", Utc::now()))
            .await
            .unwrap();
        tx.append_audit(NewAuditEntry::new(
            AuditAction::PaymentVerified,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let order = store.order("order_A").await.unwrap();
        assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(store.audit_log().await.len(), 1);
        assert!(store.user(user.id).await.is_some());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_writes() {
        let (store, user, _) = seeded().await;
        store.fail_once(FailPoint::Commit);

        let mut tx = store.begin().await.unwrap();
        tx.increment_referral_stats(user.id, 10).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.user(user.id).await.unwrap().referral_earnings, 0);

        // 故障只触发一次
        let mut tx = store.begin().await.unwrap();
        tx.increment_referral_stats(user.id, 10).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.user(user.id).await.unwrap().referral_earnings, 10);
    }

    #[tokio::test]
    async fn test_eligibility_compare_and_set() {
        let (store, user, _) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.grant_refund_eligibility(user.id).await.unwrap());
        assert!(!tx.grant_refund_eligibility(user.id).await.unwrap());
        assert!(
            !tx.advance_refund_status(user.id, RefundStatus::NotEligible, RefundStatus::Processing)
                .await
                .unwrap()
        );
        assert!(
            tx.advance_refund_status(user.id, RefundStatus::Eligible, RefundStatus::Processing)
                .await
                .unwrap()
        );
        tx.commit().await.unwrap();

        let user = store.user(user.id).await.unwrap();
        assert!(user.refund_eligible);
        assert_eq!(user.refund_status, RefundStatus::Processing);
    }

    #[tokio::test]
    async fn test_duplicate_referral_pair_ignored() {
        let (store, user, order) = seeded().await;
        let referrer = User::new("ref@studyhub.test", "Referrer", "AB12CD");
        store.insert_user(referrer.clone()).await;

        let new_referral = NewReferral {
            referrer_id: referrer.id,
            referred_user_id: user.id,
            referral_code: "AB12CD".to_string(),
            reward_amount: 49,
            order_id: order.id,
        };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_completed_referral(new_referral.clone()).await.unwrap().is_some());
        assert!(tx.insert_completed_referral(new_referral).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(store.referrals().await.len(), 1);
    }
}
