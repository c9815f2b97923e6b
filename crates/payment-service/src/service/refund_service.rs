//! 退款服务
//!
//! 达成推荐里程碑的用户可申请一次全额退款（原路退回）。
//! 申请在单个事务内完成：锁定用户 -> 资格检查 -> 创建退款单 -> 推进退款状态 -> 审计。
//! 资格状态 `eligible -> processing` 使用条件更新，并发申请只有一个成功。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use studyhub_shared::observability::metrics;

use crate::error::{PaymentError, Result};
use crate::models::{
    AuditAction, NewAuditEntry, NewRefund, REFUND_METHOD_ORIGINAL_PAYMENT, RefundRecordStatus,
    RefundStatus, Refund, User,
};
use crate::notification::PaymentNotifier;
use crate::policy::RewardPolicy;
use crate::service::dto::ReferralSummary;
use crate::store::{PaymentStore, PaymentTx};

/// 概览中展示的最近推荐条数
const RECENT_REFERRALS_LIMIT: i64 = 10;

/// 退款服务
pub struct RefundService<S: PaymentStore> {
    store: Arc<S>,
    notifier: Arc<dyn PaymentNotifier>,
    policy: RewardPolicy,
    tx_timeout: Duration,
}

impl<S: PaymentStore> RefundService<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn PaymentNotifier>,
        policy: RewardPolicy,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            tx_timeout,
        }
    }

    /// 申请退款
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn request_refund(&self, user_id: Uuid) -> Result<Refund> {
        let result = match tokio::time::timeout(self.tx_timeout, self.create_refund(user_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("退款事务超时，已回滚");
                Err(PaymentError::TransientStore("退款事务超时".to_string()))
            }
        };

        match &result {
            Ok(_) => metrics::record_refund_request("accepted"),
            Err(PaymentError::NotEligible(reason)) => {
                info!(reason = %reason, "退款申请被拒绝");
                metrics::record_refund_request("rejected");
            }
            Err(_) => metrics::record_refund_request("error"),
        }

        let (refund, user) = result?;
        self.notifier.send_refund_processing_notice(&user, refund.amount);
        info!(refund_id = %refund.id, amount = refund.amount, "退款申请已受理");
        Ok(refund)
    }

    async fn create_refund(&self, user_id: Uuid) -> Result<(Refund, User)> {
        let mut tx = self.store.begin().await?;

        let user = tx
            .lock_user(user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(user_id))?;

        if user.refund_status != RefundStatus::Eligible {
            return Err(PaymentError::NotEligible(format!(
                "当前退款状态为 {}",
                user.refund_status
            )));
        }
        if tx.has_active_refund(user_id).await? {
            return Err(PaymentError::NotEligible("已有处理中的退款".to_string()));
        }
        let amount = user
            .payment_amount
            .filter(|amount| *amount > 0)
            .ok_or_else(|| PaymentError::NotEligible("没有可退款的支付记录".to_string()))?;

        let refund = tx
            .insert_refund(NewRefund {
                user_id,
                amount,
                status: RefundRecordStatus::Processing,
                method: REFUND_METHOD_ORIGINAL_PAYMENT.to_string(),
                referral_count_snapshot: user.total_referrals,
            })
            .await?;

        if !tx
            .advance_refund_status(user_id, RefundStatus::Eligible, RefundStatus::Processing)
            .await?
        {
            return Err(PaymentError::NotEligible("退款状态已变更".to_string()));
        }

        tx.append_audit(
            NewAuditEntry::new(
                AuditAction::RefundRequested,
                json!({
                    "refundId": refund.id,
                    "amount": amount,
                    "method": refund.method,
                    "referralCount": user.total_referrals,
                    "paymentId": user.payment_id,
                }),
            )
            .with_user(user_id),
        )
        .await?;

        tx.commit().await?;
        Ok((refund, user))
    }

    /// 推荐概览
    pub async fn referral_summary(&self, user_id: Uuid) -> Result<ReferralSummary> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(user_id))?;
        let recent_referrals = self
            .store
            .list_referrals_by_referrer(user_id, RECENT_REFERRALS_LIMIT)
            .await?;
        let active_refund = self.store.find_active_refund(user_id).await?;

        let milestone = self.policy.milestone();
        Ok(ReferralSummary {
            referral_code: user.referral_code,
            total_referrals: user.total_referrals,
            referral_earnings: user.referral_earnings,
            refund_eligible: user.refund_eligible,
            refund_status: user.refund_status,
            remaining_for_refund: (milestone - user.total_referrals).max(0),
            milestone,
            recent_referrals,
            active_refund,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::MockPaymentNotifier;
    use crate::store::MemoryPaymentStore;
    use chrono::Utc;

    fn eligible_user() -> User {
        let mut user = User::new("star@studyhub.test", "Star", "STAR20");
        user.total_referrals = 20;
        user.referral_earnings = 20 * 49;
        user.refund_eligible = true;
        user.refund_status = RefundStatus::Eligible;
        user.payment_id = Some("pay_star".to_string());
        user.payment_amount = Some(499);
        user.paid_at = Some(Utc::now());
        user
    }

    fn service(store: Arc<MemoryPaymentStore>, notifier: MockPaymentNotifier) -> RefundService<MemoryPaymentStore> {
        RefundService::new(
            store,
            Arc::new(notifier),
            RewardPolicy::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_refund_without_payment_amount_is_rejected() {
        let store = Arc::new(MemoryPaymentStore::new());
        let mut user = eligible_user();
        user.payment_amount = None;
        store.insert_user(user.clone()).await;

        let mut notifier = MockPaymentNotifier::new();
        notifier.expect_send_refund_processing_notice().never();

        let err = service(store.clone(), notifier)
            .request_refund(user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotEligible(_)));
        assert!(store.refunds().await.is_empty());
        assert_eq!(store.user(user.id).await.unwrap().refund_status, RefundStatus::Eligible);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let store = Arc::new(MemoryPaymentStore::new());
        let err = service(store, MockPaymentNotifier::new())
            .request_refund(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_summary_counts_remaining() {
        let store = Arc::new(MemoryPaymentStore::new());
        let mut user = User::new("mid@studyhub.test", "Mid", "MID007");
        user.total_referrals = 7;
        store.insert_user(user.clone()).await;

        let summary = service(store, MockPaymentNotifier::new())
            .referral_summary(user.id)
            .await
            .unwrap();
        assert_eq!(summary.referral_code, "MID007");
        assert_eq!(summary.remaining_for_refund, 13);
        assert_eq!(summary.milestone, 20);
        assert!(summary.active_refund.is_none());
    }

    #[tokio::test]
    async fn test_summary_after_refund_shows_active_refund() {
        let store = Arc::new(MemoryPaymentStore::new());
        let user = eligible_user();
        store.insert_user(user.clone()).await;

        let mut notifier = MockPaymentNotifier::new();
        notifier
            .expect_send_refund_processing_notice()
            .withf(|_, amount| *amount == 499)
            .times(1)
            .return_const(());
        let service = service(store, notifier);

        let refund = service.request_refund(user.id).await.unwrap();
        let summary = service.referral_summary(user.id).await.unwrap();

        assert_eq!(summary.refund_status, RefundStatus::Processing);
        assert_eq!(summary.remaining_for_refund, 0);
        assert_eq!(summary.active_refund.map(|r| r.id), Some(refund.id));
    }
}
