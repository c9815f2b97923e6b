//! 支付验证服务（事务协调）
//!
//! ## 验证流程
//!
//! 1. 签名校验（失败写入 `payment_rejected` 审计，不做任何状态变更）
//! 2. 读取订单：不存在 -> `OrderNotFound`，已终态 -> `AlreadyProcessed`
//! 3. 事务外向网关拉取支付详情，核对金额与订单号，确认已扣款
//! 4. 单个存储事务（带超时）：
//!    锁订单并复查终态 -> 完成订单 -> 升级付款用户
//!    -> 推荐奖励（原子递增）-> 里程碑资格（条件更新）-> 审计 -> 提交
//! 5. 提交成功后异步发送通知
//!
//! 订单终态是唯一的幂等保护：重复回调、并发回调与重试都只会完成一次。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use studyhub_shared::observability::metrics;

use crate::config::{GatewayConfig, PaymentConfig};
use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayPayment, PaymentGateway};
use crate::models::{
    AuditAction, NewAuditEntry, NewReferral, OrderStatus, PaymentOrder, RefundStatus, User,
    UserPaymentRecord,
};
use crate::notification::PaymentNotifier;
use crate::policy::RewardPolicy;
use crate::service::dto::{PaymentCallback, PaymentReceipt, ReferralResult, VerificationOutcome};
use crate::signature;
use crate::store::{OrderStatusUpdate, PaymentStore, PaymentTx};

/// 触发验证的 Webhook 事件
const WEBHOOK_EVENT_CAPTURED: &str = "payment.captured";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    payload: Option<WebhookPayload>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<WebhookEntity>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity {
    entity: GatewayPayment,
}

/// Webhook 处理结果
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Processed(VerificationOutcome),
    /// 不关心的事件类型，直接确认
    Ignored { event: String },
}

/// 事务内处理结果
enum Applied {
    AlreadyProcessed(PaymentOrder),
    Completed {
        receipt: PaymentReceipt,
        payer: User,
        /// 本次新获得退款资格的推荐人
        milestone_referrer: Option<User>,
    },
}

/// 支付验证服务
pub struct PaymentVerificationService<S: PaymentStore> {
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn PaymentNotifier>,
    policy: RewardPolicy,
    key_secret: String,
    webhook_secret: String,
    tx_timeout: Duration,
}

impl<S: PaymentStore> PaymentVerificationService<S> {
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
        policy: RewardPolicy,
        gateway_config: &GatewayConfig,
        payment_config: &PaymentConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            policy,
            key_secret: gateway_config.key_secret.clone(),
            webhook_secret: gateway_config.webhook_secret.clone(),
            tx_timeout: payment_config.transaction_timeout(),
        }
    }

    /// 验证客户端回传的支付回调
    ///
    /// `user_id` 为调用方身份，订单不属于该用户时按订单不存在处理。
    #[instrument(
        skip(self, callback),
        fields(
            gateway_order_id = %callback.gateway_order_id,
            payment_id = %callback.payment_id
        )
    )]
    pub async fn verify_payment(
        &self,
        user_id: Uuid,
        callback: &PaymentCallback,
    ) -> Result<VerificationOutcome> {
        let started = Instant::now();

        let result = if signature::verify(
            &callback.gateway_order_id,
            &callback.payment_id,
            &callback.signature,
            &self.key_secret,
        ) {
            self.process_verified(Some(user_id), &callback.gateway_order_id, &callback.payment_id)
                .await
        } else {
            warn!(%user_id, security_event = true, "支付签名校验失败");
            self.audit_best_effort(
                NewAuditEntry::new(
                    AuditAction::PaymentRejected,
                    json!({
                        "source": "callback",
                        "gatewayOrderId": callback.gateway_order_id,
                        "paymentId": callback.payment_id,
                        "reason": "invalid_signature",
                    }),
                )
                .with_user(user_id),
            )
            .await;
            Err(PaymentError::Unauthorized)
        };

        Self::record_outcome(&result, started);
        result
    }

    /// 处理网关 Webhook，签名覆盖原始请求体
    #[instrument(skip(self, body, signature_header), fields(body_len = body.len()))]
    pub async fn handle_webhook(&self, body: &[u8], signature_header: &str) -> Result<WebhookOutcome> {
        if !signature::verify_webhook(body, signature_header, &self.webhook_secret) {
            warn!(security_event = true, "Webhook 签名校验失败");
            self.audit_best_effort(NewAuditEntry::new(
                AuditAction::PaymentRejected,
                json!({ "source": "webhook", "reason": "invalid_signature" }),
            ))
            .await;
            return Err(PaymentError::Unauthorized);
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| PaymentError::Validation(format!("Webhook 请求体无效: {}", e)))?;

        if event.event != WEBHOOK_EVENT_CAPTURED {
            info!(event = %event.event, "忽略 Webhook 事件");
            return Ok(WebhookOutcome::Ignored { event: event.event });
        }

        let entity = event
            .payload
            .and_then(|p| p.payment)
            .map(|p| p.entity)
            .ok_or_else(|| PaymentError::Validation("Webhook 缺少 payment 实体".to_string()))?;
        let gateway_order_id = entity
            .order_id
            .ok_or_else(|| PaymentError::Validation("Webhook 支付缺少 order_id".to_string()))?;

        let started = Instant::now();
        let result = self.process_verified(None, &gateway_order_id, &entity.id).await;
        Self::record_outcome(&result, started);
        result.map(WebhookOutcome::Processed)
    }

    /// 签名已通过后的处理
    async fn process_verified(
        &self,
        expected_user: Option<Uuid>,
        gateway_order_id: &str,
        payment_id: &str,
    ) -> Result<VerificationOutcome> {
        let order = self
            .store
            .find_order_by_gateway_id(gateway_order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(gateway_order_id.to_string()))?;

        if let Some(user_id) = expected_user.filter(|id| *id != order.user_id) {
            warn!(%user_id, owner = %order.user_id, "订单不属于当前用户");
            return Err(PaymentError::OrderNotFound(gateway_order_id.to_string()));
        }

        if order.is_terminal() {
            return Ok(Self::already_processed(order, payment_id));
        }

        let payment = self.gateway.fetch_payment(payment_id).await?;
        self.check_integrity(&order, &payment).await?;

        if !payment.status.is_settled() {
            warn!(status = payment.status.as_str(), "网关支付尚未完成扣款");
            let err = PaymentError::PaymentNotCaptured {
                payment_id: payment.id.clone(),
                status: payment.status.as_str().to_string(),
            };
            self.audit_payment_failure(&order, &payment.id, &err).await;
            return Err(err);
        }

        let applied = match tokio::time::timeout(self.tx_timeout, self.apply_payment(&order, &payment.id)).await {
            Ok(applied) => applied,
            Err(_) => {
                warn!(timeout_ms = self.tx_timeout.as_millis() as u64, "支付事务超时，已回滚");
                Err(PaymentError::TransientStore("支付事务超时".to_string()))
            }
        };
        // 事务已回滚，失败记录写在事务之外
        let applied = match applied {
            Ok(applied) => applied,
            Err(e) => {
                self.audit_payment_failure(&order, &payment.id, &e).await;
                return Err(e);
            }
        };

        match applied {
            Applied::AlreadyProcessed(order) => Ok(Self::already_processed(order, payment_id)),
            Applied::Completed {
                receipt,
                payer,
                milestone_referrer,
            } => {
                // 通知只在提交之后发出
                self.notifier.send_payment_success_notice(&payer, receipt.order.amount);
                if let Some(referrer) = &milestone_referrer {
                    self.notifier.send_milestone_notice(referrer, referrer.total_referrals);
                }
                if receipt.referral.is_rewarded() {
                    metrics::record_referral_reward(receipt.referral.milestone_reached());
                }

                info!(
                    order_id = %receipt.order.id,
                    user_id = %payer.id,
                    referral_processed = receipt.referral.is_rewarded(),
                    milestone_reached = receipt.referral.milestone_reached(),
                    "支付验证完成"
                );
                Ok(VerificationOutcome::Completed(receipt))
            }
        }
    }

    /// 网关数据与订单交叉核对
    async fn check_integrity(&self, order: &PaymentOrder, payment: &GatewayPayment) -> Result<()> {
        let mismatch = if payment.amount != order.amount {
            Some(format!("金额不一致: 订单 {}，网关 {}", order.amount, payment.amount))
        } else if !payment.currency.eq_ignore_ascii_case(&order.currency) {
            Some(format!("币种不一致: 订单 {}，网关 {}", order.currency, payment.currency))
        } else if let Some(reported) = payment
            .order_id
            .as_deref()
            .filter(|id| *id != order.gateway_order_id)
        {
            Some(format!("订单号不一致: 网关支付属于 {}", reported))
        } else {
            None
        };

        let Some(reason) = mismatch else {
            return Ok(());
        };

        error!(
            order_id = %order.id,
            payment_id = %payment.id,
            reason = %reason,
            "支付数据校验失败，需要人工核查"
        );
        self.audit_best_effort(
            NewAuditEntry::new(
                AuditAction::PaymentIntegrityFailure,
                json!({
                    "paymentId": payment.id,
                    "orderAmount": order.amount,
                    "gatewayAmount": payment.amount,
                    "gatewayOrderId": payment.order_id,
                    "reason": reason,
                }),
            )
            .with_user(order.user_id)
            .with_order(order.id),
        )
        .await;
        Err(PaymentError::IntegrityError(reason))
    }

    /// 单事务内完成全部状态变更
    async fn apply_payment(&self, order: &PaymentOrder, payment_id: &str) -> Result<Applied> {
        let mut tx = self.store.begin().await?;

        let locked = tx
            .lock_order(&order.gateway_order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order.gateway_order_id.clone()))?;
        if locked.is_terminal() {
            // 并发的重复回调，事务随 drop 回滚
            return Ok(Applied::AlreadyProcessed(locked));
        }

        let now = Utc::now();
        let completed = tx
            .update_order_status(locked.id, OrderStatusUpdate::completed(payment_id, now))
            .await?;

        let payer = tx
            .lock_user(locked.user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(locked.user_id))?;
        let payer = tx
            .record_user_payment(
                payer.id,
                UserPaymentRecord {
                    payment_id: payment_id.to_string(),
                    amount: locked.amount,
                    paid_at: now,
                },
            )
            .await?;

        let (referral, milestone_referrer) = match locked.referral_code.as_deref() {
            Some(code) => self.apply_referral(&mut tx, &locked, &payer, code).await?,
            None => (ReferralResult::NotApplicable, None),
        };

        tx.append_audit(
            NewAuditEntry::new(
                AuditAction::PaymentVerified,
                json!({
                    "gatewayOrderId": locked.gateway_order_id,
                    "paymentId": payment_id,
                    "amount": locked.amount,
                    "currency": locked.currency,
                    "role": payer.role,
                }),
            )
            .with_user(payer.id)
            .with_order(locked.id),
        )
        .await?;

        tx.commit().await?;

        Ok(Applied::Completed {
            receipt: PaymentReceipt {
                order: completed,
                referral,
            },
            payer,
            milestone_referrer,
        })
    }

    /// 推荐奖励与里程碑
    async fn apply_referral(
        &self,
        tx: &mut S::Tx,
        order: &PaymentOrder,
        payer: &User,
        code: &str,
    ) -> Result<(ReferralResult, Option<User>)> {
        let referrer = match tx.find_user_by_referral_code(code).await? {
            None => return Self::skip_referral(tx, order, code, "unknown_code").await,
            Some(referrer) if referrer.id == payer.id => {
                return Self::skip_referral(tx, order, code, "self_referral").await;
            }
            Some(referrer) => referrer,
        };

        let reward = self.policy.compute_reward(order.amount);
        let inserted = tx
            .insert_completed_referral(NewReferral {
                referrer_id: referrer.id,
                referred_user_id: payer.id,
                referral_code: code.to_string(),
                reward_amount: reward,
                order_id: order.id,
            })
            .await?;
        if inserted.is_none() {
            return Self::skip_referral(tx, order, code, "already_rewarded").await;
        }

        tx.set_referred_by_if_empty(payer.id, code).await?;
        let mut stats = tx.increment_referral_stats(referrer.id, reward).await?;

        let granted = if self
            .policy
            .should_grant_eligibility(stats.total_referrals, stats.refund_eligible)
        {
            tx.grant_refund_eligibility(referrer.id).await?
        } else {
            false
        };
        if granted {
            stats.refund_eligible = true;
            stats.refund_status = RefundStatus::Eligible;
        }

        tx.append_audit(
            NewAuditEntry::new(
                AuditAction::ReferralRewarded,
                json!({
                    "referrerId": referrer.id,
                    "referralCode": code,
                    "rewardAmount": reward,
                    "totalReferrals": stats.total_referrals,
                }),
            )
            .with_user(payer.id)
            .with_order(order.id),
        )
        .await?;

        if granted {
            tx.append_audit(
                NewAuditEntry::new(
                    AuditAction::ReferralMilestone,
                    json!({
                        "totalReferrals": stats.total_referrals,
                        "milestone": self.policy.milestone(),
                    }),
                )
                .with_user(referrer.id)
                .with_order(order.id),
            )
            .await?;
            info!(
                referrer_id = %referrer.id,
                total_referrals = stats.total_referrals,
                "推荐人达成里程碑，获得退款资格"
            );
        }

        Ok((
            ReferralResult::Rewarded {
                referrer_id: referrer.id,
                reward_amount: reward,
                total_referrals: stats.total_referrals,
                milestone_reached: granted,
            },
            granted.then_some(stats),
        ))
    }

    async fn skip_referral(
        tx: &mut S::Tx,
        order: &PaymentOrder,
        code: &str,
        reason: &str,
    ) -> Result<(ReferralResult, Option<User>)> {
        warn!(referral_code = %code, reason, "跳过推荐奖励");
        tx.append_audit(
            NewAuditEntry::new(
                AuditAction::ReferralSkipped,
                json!({ "referralCode": code, "reason": reason }),
            )
            .with_user(order.user_id)
            .with_order(order.id),
        )
        .await?;
        Ok((
            ReferralResult::Skipped {
                reason: reason.to_string(),
            },
            None,
        ))
    }

    fn already_processed(order: PaymentOrder, payment_id: &str) -> VerificationOutcome {
        if order.status != OrderStatus::Completed {
            warn!(
                status = %order.status,
                payment_id,
                "订单已关闭但收到有效支付，需要人工核查"
            );
        } else {
            info!(order_id = %order.id, "订单已处理，忽略重复回调");
        }
        VerificationOutcome::AlreadyProcessed(order)
    }

    async fn audit_payment_failure(&self, order: &PaymentOrder, payment_id: &str, err: &PaymentError) {
        self.audit_best_effort(
            NewAuditEntry::new(
                AuditAction::PaymentFailed,
                json!({
                    "gatewayOrderId": order.gateway_order_id,
                    "paymentId": payment_id,
                    "errorCode": err.error_code(),
                    "reason": err.to_string(),
                }),
            )
            .with_user(order.user_id)
            .with_order(order.id),
        )
        .await;
    }

    async fn audit_best_effort(&self, entry: NewAuditEntry) {
        if let Err(e) = self.store.append_audit(entry).await {
            warn!(error = %e, "审计日志写入失败");
        }
    }

    fn record_outcome(result: &Result<VerificationOutcome>, started: Instant) {
        let outcome = match result {
            Ok(outcome) => outcome.label(),
            Err(e) => e.error_code(),
        };
        metrics::record_payment_verification(outcome, started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayPaymentStatus, InMemoryGateway};
    use crate::models::{NewPaymentOrder, generate_receipt};
    use crate::notification::MockPaymentNotifier;
    use crate::store::MemoryPaymentStore;

    struct Fixture {
        store: Arc<MemoryPaymentStore>,
        gateway: Arc<InMemoryGateway>,
        payer: User,
        order: PaymentOrder,
    }

    async fn fixture(referral_code: Option<&str>) -> Fixture {
        let store = Arc::new(MemoryPaymentStore::new());
        let gateway = Arc::new(InMemoryGateway::new("key", GatewayConfig::default().key_secret));
        let payer = User::new("payer@studyhub.test", "Payer", "PAYER1");
        store.insert_user(payer.clone()).await;
        let order = store
            .insert_order(NewPaymentOrder {
                user_id: payer.id,
                gateway_order_id: "order_T1".to_string(),
                amount: 499,
                currency: "INR".to_string(),
                receipt: generate_receipt(),
                referral_code: referral_code.map(str::to_string),
            })
            .await
            .unwrap();
        Fixture {
            store,
            gateway,
            payer,
            order,
        }
    }

    fn service(f: &Fixture, notifier: MockPaymentNotifier) -> PaymentVerificationService<MemoryPaymentStore> {
        PaymentVerificationService::new(
            f.store.clone(),
            f.gateway.clone(),
            Arc::new(notifier),
            RewardPolicy::default(),
            &GatewayConfig::default(),
            &PaymentConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_payment_without_referral_notifies_once() {
        let f = fixture(None).await;
        let mut notifier = MockPaymentNotifier::new();
        notifier
            .expect_send_payment_success_notice()
            .withf(|_, amount| *amount == 499)
            .times(1)
            .return_const(());
        notifier.expect_send_milestone_notice().never();

        let (payment_id, signature) = f.gateway.capture("order_T1", 499);
        let outcome = service(&f, notifier)
            .verify_payment(
                f.payer.id,
                &PaymentCallback {
                    gateway_order_id: "order_T1".to_string(),
                    payment_id,
                    signature,
                },
            )
            .await
            .unwrap();

        assert!(!outcome.is_already_processed());
        assert!(!outcome.referral_processed());
        assert_eq!(outcome.order().status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_signature_notifies_nobody() {
        let f = fixture(None).await;
        let mut notifier = MockPaymentNotifier::new();
        notifier.expect_send_payment_success_notice().never();

        let (payment_id, _) = f.gateway.capture("order_T1", 499);
        let err = service(&f, notifier)
            .verify_payment(
                f.payer.id,
                &PaymentCallback {
                    gateway_order_id: "order_T1".to_string(),
                    payment_id,
                    signature: "00".repeat(32),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Unauthorized));
        assert_eq!(f.store.order("order_T1").await.unwrap().status, OrderStatus::Created);
        let audits = f.store.audit_log().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::PaymentRejected);
    }

    #[tokio::test]
    async fn test_authorized_payment_is_accepted() {
        let f = fixture(None).await;
        let mut notifier = MockPaymentNotifier::new();
        notifier.expect_send_payment_success_notice().return_const(());

        f.gateway.register_payment(GatewayPayment {
            id: "pay_auth".to_string(),
            order_id: Some("order_T1".to_string()),
            amount: 499,
            currency: "INR".to_string(),
            status: GatewayPaymentStatus::Authorized,
        });
        let signature = signature::sign("order_T1", "pay_auth", f.gateway.key_secret());

        let outcome = service(&f, notifier)
            .verify_payment(
                f.payer.id,
                &PaymentCallback {
                    gateway_order_id: "order_T1".to_string(),
                    payment_id: "pay_auth".to_string(),
                    signature,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.order().gateway_payment_id.as_deref(), Some("pay_auth"));
        assert_eq!(outcome.order().id, f.order.id);
    }

    #[tokio::test]
    async fn test_closed_order_reports_already_processed() {
        let f = fixture(None).await;
        let mut tx = f.store.begin().await.unwrap();
        tx.update_order_status(f.order.id, OrderStatusUpdate::closed(OrderStatus::Cancelled, None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut notifier = MockPaymentNotifier::new();
        notifier.expect_send_payment_success_notice().never();

        let (payment_id, signature) = f.gateway.capture("order_T1", 499);
        let outcome = service(&f, notifier)
            .verify_payment(
                f.payer.id,
                &PaymentCallback {
                    gateway_order_id: "order_T1".to_string(),
                    payment_id,
                    signature,
                },
            )
            .await
            .unwrap();

        assert!(outcome.is_already_processed());
        assert_eq!(outcome.order().status, OrderStatus::Cancelled);
        assert!(!f.store.user(f.payer.id).await.unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_milestone_notice_sees_granted_eligibility() {
        let f = fixture(Some("AB12CD")).await;
        let mut referrer = User::new("ravi@studyhub.test", "Ravi", "AB12CD");
        referrer.total_referrals = 19;
        f.store.insert_user(referrer.clone()).await;

        let mut notifier = MockPaymentNotifier::new();
        notifier.expect_send_payment_success_notice().return_const(());
        let referrer_id = referrer.id;
        notifier
            .expect_send_milestone_notice()
            .withf(move |user, count| {
                user.id == referrer_id
                    && *count == 20
                    && user.refund_eligible
                    && user.refund_status == RefundStatus::Eligible
            })
            .times(1)
            .return_const(());

        let (payment_id, signature) = f.gateway.capture("order_T1", 499);
        let outcome = service(&f, notifier)
            .verify_payment(
                f.payer.id,
                &PaymentCallback {
                    gateway_order_id: "order_T1".to_string(),
                    payment_id,
                    signature,
                },
            )
            .await
            .unwrap();
        assert!(outcome.milestone_reached());
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events() {
        let f = fixture(None).await;
        let notifier = MockPaymentNotifier::new();
        let body = br#"{"event":"order.paid","payload":{}}"#;
        let signature = signature::sign_webhook(body, &GatewayConfig::default().webhook_secret);

        let outcome = service(&f, notifier).handle_webhook(body, &signature).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { event } if event == "order.paid"));
    }
}
