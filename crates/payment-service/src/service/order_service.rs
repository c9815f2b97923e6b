//! 订单服务
//!
//! 下单时先在网关创建远端订单，成功后才在本地落库 `created` 记录；
//! 网关失败时本地不留任何记录。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use studyhub_shared::observability::metrics;

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::gateway::{PaymentGateway, RemoteOrderRequest};
use crate::models::{AuditAction, NewAuditEntry, NewPaymentOrder, OrderStatus, PaymentOrder, generate_receipt};
use crate::service::dto::{CreateOrderInput, CreatedOrder};
use crate::store::{OrderStatusUpdate, PaymentStore, PaymentTx};

/// 推荐码长度范围
const REFERRAL_CODE_MIN_LEN: usize = 4;
const REFERRAL_CODE_MAX_LEN: usize = 32;

/// 规范化推荐码：去空白、转大写，空串视为未填写
pub fn normalize_referral_code(code: Option<&str>) -> Result<Option<String>> {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    let code = code.to_ascii_uppercase();
    let valid_len = (REFERRAL_CODE_MIN_LEN..=REFERRAL_CODE_MAX_LEN).contains(&code.len());
    if !valid_len || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PaymentError::Validation(format!("推荐码格式无效: {}", code)));
    }
    Ok(Some(code))
}

/// 币种必须是三位大写 ISO 代码
fn validate_currency(currency: &str) -> Result<()> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(PaymentError::Validation(format!("币种无效: {}", currency)))
    }
}

/// 订单服务
pub struct OrderService<S: PaymentStore> {
    store: Arc<S>,
    gateway: Arc<dyn PaymentGateway>,
    config: PaymentConfig,
}

impl<S: PaymentStore> OrderService<S> {
    pub fn new(store: Arc<S>, gateway: Arc<dyn PaymentGateway>, config: PaymentConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// 创建支付订单
    #[instrument(skip(self, input), fields(user_id = %input.user_id, amount = input.amount))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<CreatedOrder> {
        if input.amount <= 0 {
            return Err(PaymentError::Validation("金额必须大于 0".to_string()));
        }
        if input.amount > self.config.max_amount {
            return Err(PaymentError::Validation(format!(
                "金额超过上限 {}",
                self.config.max_amount
            )));
        }

        let currency = input
            .currency
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| self.config.default_currency.clone());
        validate_currency(&currency)?;

        let referral_code = normalize_referral_code(input.referral_code.as_deref())?;

        // 推荐码在验证阶段才解析，未知推荐码不阻止下单
        self.store
            .find_user(input.user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(input.user_id))?;

        let receipt = generate_receipt();
        let mut notes = HashMap::new();
        notes.insert("user_id".to_string(), input.user_id.to_string());
        if let Some(code) = &referral_code {
            notes.insert("referral_code".to_string(), code.clone());
        }

        let remote = self
            .gateway
            .create_remote_order(&RemoteOrderRequest {
                amount: input.amount,
                currency: currency.clone(),
                receipt: receipt.clone(),
                notes,
            })
            .await?;

        let order = self
            .store
            .insert_order(NewPaymentOrder {
                user_id: input.user_id,
                gateway_order_id: remote.id,
                amount: input.amount,
                currency,
                receipt,
                referral_code,
            })
            .await?;

        metrics::record_order_created(&order.currency);
        info!(
            gateway_order_id = %order.gateway_order_id,
            receipt = %order.receipt,
            "支付订单已创建"
        );

        Ok(CreatedOrder {
            gateway_order_id: order.gateway_order_id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            key_id: self.gateway.key_id(),
        })
    }

    /// 查询订单（只能查看自己的订单）
    pub async fn get_order(&self, user_id: Uuid, gateway_order_id: &str) -> Result<PaymentOrder> {
        self.store
            .find_order_by_gateway_id(gateway_order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| PaymentError::OrderNotFound(gateway_order_id.to_string()))
    }

    /// 客户端上报支付失败或取消
    ///
    /// 已处于终态的订单原样返回，不做任何写入。
    #[instrument(skip(self, reason), fields(user_id = %user_id, gateway_order_id = %gateway_order_id))]
    pub async fn mark_order_failed(
        &self,
        user_id: Uuid,
        gateway_order_id: &str,
        status: OrderStatus,
        reason: Option<String>,
    ) -> Result<PaymentOrder> {
        if !matches!(status, OrderStatus::Failed | OrderStatus::Cancelled) {
            return Err(PaymentError::Validation(format!(
                "只能上报 failed 或 cancelled，收到 {}",
                status
            )));
        }

        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(gateway_order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| PaymentError::OrderNotFound(gateway_order_id.to_string()))?;

        if order.is_terminal() {
            if order.status != status {
                warn!(current = %order.status, requested = %status, "订单已是终态，忽略失败上报");
            }
            return Ok(order);
        }
        if !order.status.can_transition_to(status) {
            return Err(PaymentError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        let updated = tx
            .update_order_status(order.id, OrderStatusUpdate::closed(status, reason.clone()))
            .await?;
        tx.append_audit(
            NewAuditEntry::new(
                AuditAction::OrderFailed,
                json!({
                    "gatewayOrderId": gateway_order_id,
                    "status": status.as_str(),
                    "reason": reason,
                }),
            )
            .with_user(user_id)
            .with_order(order.id),
        )
        .await?;
        tx.commit().await?;

        info!(status = %status, "订单已关闭");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MockPaymentGateway, RemoteOrder};
    use crate::models::User;
    use crate::store::MemoryPaymentStore;

    async fn store_with_user() -> (Arc<MemoryPaymentStore>, User) {
        let store = Arc::new(MemoryPaymentStore::new());
        let user = User::new("buyer@studyhub.test", "Buyer", "BUYER1");
        store.insert_user(user.clone()).await;
        (store, user)
    }

    fn input(user_id: Uuid, amount: i64) -> CreateOrderInput {
        CreateOrderInput {
            user_id,
            amount,
            currency: None,
            referral_code: Some(" ab12cd ".to_string()),
        }
    }

    #[test]
    fn test_normalize_referral_code() {
        assert_eq!(normalize_referral_code(None).unwrap(), None);
        assert_eq!(normalize_referral_code(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_referral_code(Some(" ab12cd ")).unwrap(),
            Some("AB12CD".to_string())
        );
        assert!(normalize_referral_code(Some("AB1")).is_err());
        assert!(normalize_referral_code(Some("AB-12CD")).is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("INR").is_ok());
        assert!(validate_currency("inr").is_err());
        assert!(validate_currency("RUPEE").is_err());
    }

    #[tokio::test]
    async fn test_create_order_persists_after_gateway() {
        let (store, user) = store_with_user().await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_remote_order()
            .withf(|req| req.amount == 49_900 && req.notes.get("referral_code").map(String::as_str) == Some("AB12CD"))
            .times(1)
            .returning(|req| {
                Ok(RemoteOrder {
                    id: "order_remote_1".to_string(),
                    amount: req.amount,
                    currency: req.currency.clone(),
                })
            });
        gateway.expect_key_id().return_const("rzp_key".to_string());

        let service = OrderService::new(store.clone(), Arc::new(gateway), PaymentConfig::default());
        let created = service.create_order(input(user.id, 49_900)).await.unwrap();

        assert_eq!(created.gateway_order_id, "order_remote_1");
        assert_eq!(created.currency, "INR");
        assert_eq!(created.key_id, "rzp_key");

        let stored = store.order("order_remote_1").await.unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
        assert_eq!(stored.referral_code.as_deref(), Some("AB12CD"));
    }

    #[tokio::test]
    async fn test_gateway_failure_persists_nothing() {
        let (store, user) = store_with_user().await;
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_remote_order()
            .returning(|_| Err(PaymentError::Gateway("503".to_string())));

        let service = OrderService::new(store.clone(), Arc::new(gateway), PaymentConfig::default());
        let err = service.create_order(input(user.id, 49_900)).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(store.audit_log().await.is_empty());
        assert!(service.get_order(user.id, "order_remote_1").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_amount_never_reaches_gateway() {
        let (store, user) = store_with_user().await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_remote_order().never();

        let service = OrderService::new(store, Arc::new(gateway), PaymentConfig::default());

        for amount in [0, -1, PaymentConfig::default().max_amount + 1] {
            let err = service.create_order(input(user.id, amount)).await.unwrap_err();
            assert!(matches!(err, PaymentError::Validation(_)), "{}", amount);
        }
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let (store, _) = store_with_user().await;
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_remote_order().never();

        let service = OrderService::new(store, Arc::new(gateway), PaymentConfig::default());
        let err = service.create_order(input(Uuid::new_v4(), 100)).await.unwrap_err();
        assert!(matches!(err, PaymentError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_mark_order_failed_is_forward_only() {
        let (store, user) = store_with_user().await;
        let gateway = Arc::new(crate::gateway::InMemoryGateway::new("key", "secret"));
        let service = OrderService::new(store.clone(), gateway, PaymentConfig::default());
        let created = service.create_order(input(user.id, 100)).await.unwrap();

        let failed = service
            .mark_order_failed(user.id, &created.gateway_order_id, OrderStatus::Failed, Some("card declined".into()))
            .await
            .unwrap();
        assert_eq!(failed.status, OrderStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));

        // 终态后再次上报保持原状
        let again = service
            .mark_order_failed(user.id, &created.gateway_order_id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Failed);

        let audits = store.audit_log().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::OrderFailed);
    }

    #[tokio::test]
    async fn test_other_users_order_is_not_found() {
        let (store, user) = store_with_user().await;
        let gateway = Arc::new(crate::gateway::InMemoryGateway::new("key", "secret"));
        let service = OrderService::new(store, gateway, PaymentConfig::default());
        let created = service.create_order(input(user.id, 100)).await.unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            service.get_order(stranger, &created.gateway_order_id).await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert!(matches!(
            service
                .mark_order_failed(stranger, &created.gateway_order_id, OrderStatus::Failed, None)
                .await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert!(matches!(
            service
                .mark_order_failed(user.id, &created.gateway_order_id, OrderStatus::Completed, None)
                .await,
            Err(PaymentError::Validation(_))
        ));
    }
}
