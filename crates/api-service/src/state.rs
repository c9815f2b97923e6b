//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use studyhub_payment::config::PaymentSettings;
use studyhub_payment::{
    OrderService, PaymentGateway, PaymentNotifier, PaymentStore, PaymentVerificationService,
    PgPaymentStore, RefundService, RewardPolicy,
};
use studyhub_shared::retry::RetryPolicy;

use crate::auth::JwtManager;

/// Axum 应用共享状态
///
/// 服务对象通过 Arc 在 handler 间共享，存储实现可替换为内存版本用于测试
pub struct AppState<S: PaymentStore = PgPaymentStore> {
    pub orders: Arc<OrderService<S>>,
    pub verifier: Arc<PaymentVerificationService<S>>,
    pub refunds: Arc<RefundService<S>>,
    pub jwt_manager: Arc<JwtManager>,
    /// 支付验证遇到瞬时错误时的重试策略
    pub retry_policy: RetryPolicy,
}

// 手动实现，避免 derive 给 S 加上 Clone 约束
impl<S: PaymentStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            verifier: self.verifier.clone(),
            refunds: self.refunds.clone(),
            jwt_manager: self.jwt_manager.clone(),
            retry_policy: self.retry_policy.clone(),
        }
    }
}

impl<S: PaymentStore> AppState<S> {
    /// 以同一存储、网关与通知器组装全部服务
    pub fn new(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
        settings: &PaymentSettings,
        jwt_manager: JwtManager,
        retry_policy: RetryPolicy,
    ) -> Self {
        let policy = RewardPolicy::from(&settings.reward);

        let orders = OrderService::new(store.clone(), gateway.clone(), settings.payment.clone());
        let verifier = PaymentVerificationService::new(
            store.clone(),
            gateway,
            notifier.clone(),
            policy,
            &settings.gateway,
            &settings.payment,
        );
        let refunds = RefundService::new(
            store,
            notifier,
            policy,
            settings.payment.transaction_timeout(),
        );

        Self {
            orders: Arc::new(orders),
            verifier: Arc::new(verifier),
            refunds: Arc::new(refunds),
            jwt_manager: Arc::new(jwt_manager),
            retry_policy,
        }
    }
}
