//! 内存网关
//!
//! 本地开发与测试使用：记录创建的订单，按需登记支付并生成合法签名，
//! 可注入瞬时故障以验证重试路径。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

use super::{GatewayPayment, GatewayPaymentStatus, PaymentGateway, RemoteOrder, RemoteOrderRequest};
use crate::error::{PaymentError, Result};
use crate::signature;

/// 内存网关
pub struct InMemoryGateway {
    key_id: String,
    key_secret: String,
    orders: Mutex<Vec<RemoteOrderRequest>>,
    payments: Mutex<HashMap<String, GatewayPayment>>,
    /// 接下来 N 次 fetch_payment 返回瞬时错误
    failing_fetches: AtomicU32,
    failing_creates: AtomicU32,
}

impl InMemoryGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            orders: Mutex::new(Vec::new()),
            payments: Mutex::new(HashMap::new()),
            failing_fetches: AtomicU32::new(0),
            failing_creates: AtomicU32::new(0),
        }
    }

    pub fn key_secret(&self) -> &str {
        &self.key_secret
    }

    /// 登记一笔已扣款的支付，返回 (payment_id, 回调签名)
    pub fn capture(&self, gateway_order_id: &str, amount: i64) -> (String, String) {
        let payment_id = format!("pay_{}", &Uuid::new_v4().simple().to_string()[..14]);
        self.register_payment(GatewayPayment {
            id: payment_id.clone(),
            order_id: Some(gateway_order_id.to_string()),
            amount,
            currency: "INR".to_string(),
            status: GatewayPaymentStatus::Captured,
        });
        let signature = signature::sign(gateway_order_id, &payment_id, &self.key_secret);
        (payment_id, signature)
    }

    /// 登记任意状态的支付
    pub fn register_payment(&self, payment: GatewayPayment) {
        self.payments.lock().insert(payment.id.clone(), payment);
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// 已创建的远端订单请求
    pub fn created_orders(&self) -> Vec<RemoteOrderRequest> {
        self.orders.lock().clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    async fn create_remote_order(&self, request: &RemoteOrderRequest) -> Result<RemoteOrder> {
        if Self::take_failure(&self.failing_creates) {
            return Err(PaymentError::Gateway("模拟网关不可用".to_string()));
        }

        self.orders.lock().push(request.clone());
        Ok(RemoteOrder {
            id: format!("order_{}", &Uuid::new_v4().simple().to_string()[..14]),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        if Self::take_failure(&self.failing_fetches) {
            return Err(PaymentError::Gateway("模拟网关超时".to_string()));
        }

        self.payments
            .lock()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::GatewayRejected {
                status: 400,
                message: format!("payment {} does not exist", payment_id),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_produces_valid_signature() {
        let gateway = InMemoryGateway::new("key", "secret");
        let (payment_id, sig) = gateway.capture("order_A", 49_900);

        assert!(signature::verify("order_A", &payment_id, &sig, "secret"));
        let payment = gateway.fetch_payment(&payment_id).await.unwrap();
        assert_eq!(payment.amount, 49_900);
        assert_eq!(payment.order_id.as_deref(), Some("order_A"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let gateway = InMemoryGateway::new("key", "secret");
        let (payment_id, _) = gateway.capture("order_A", 100);
        gateway.fail_next_fetches(1);

        assert!(gateway.fetch_payment(&payment_id).await.is_err());
        assert!(gateway.fetch_payment(&payment_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_payment_rejected() {
        let gateway = InMemoryGateway::new("key", "secret");
        let err = gateway.fetch_payment("pay_missing").await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
