//! 集成测试公共设施

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fake::Fake;
use fake::faker::name::en::Name;
use parking_lot::Mutex;
use uuid::Uuid;

use studyhub_payment::config::{GatewayConfig, PaymentConfig};
use studyhub_payment::{
    CreateOrderInput, InMemoryGateway, MemoryPaymentStore, OrderService, PaymentCallback,
    PaymentNotifier, PaymentVerificationService, RefundService, RewardPolicy, User,
};

/// 记录下来的通知
#[derive(Debug, Clone, PartialEq)]
pub enum SentNotice {
    PaymentSuccess { user_id: Uuid, amount: i64 },
    Milestone { user_id: Uuid, referral_count: i32 },
    RefundProcessing { user_id: Uuid, amount: i64 },
}

/// 只记录不发送的通知器
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().clone()
    }

    pub fn milestones(&self) -> Vec<SentNotice> {
        self.sent()
            .into_iter()
            .filter(|n| matches!(n, SentNotice::Milestone { .. }))
            .collect()
    }
}

impl PaymentNotifier for RecordingNotifier {
    fn send_payment_success_notice(&self, user: &User, amount: i64) {
        self.sent.lock().push(SentNotice::PaymentSuccess {
            user_id: user.id,
            amount,
        });
    }

    fn send_milestone_notice(&self, user: &User, referral_count: i32) {
        self.sent.lock().push(SentNotice::Milestone {
            user_id: user.id,
            referral_count,
        });
    }

    fn send_refund_processing_notice(&self, user: &User, amount: i64) {
        self.sent.lock().push(SentNotice::RefundProcessing {
            user_id: user.id,
            amount,
        });
    }
}

/// 完整装配的测试环境
pub struct Harness {
    pub store: Arc<MemoryPaymentStore>,
    pub gateway: Arc<InMemoryGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub orders: OrderService<MemoryPaymentStore>,
    pub verifier: PaymentVerificationService<MemoryPaymentStore>,
    pub refunds: RefundService<MemoryPaymentStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let gateway_config = GatewayConfig::default();
        let payment_config = PaymentConfig {
            transaction_timeout_ms: timeout.as_millis() as u64,
            ..PaymentConfig::default()
        };

        let store = Arc::new(MemoryPaymentStore::new());
        let gateway = Arc::new(InMemoryGateway::new(
            gateway_config.key_id.clone(),
            gateway_config.key_secret.clone(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());

        Self {
            orders: OrderService::new(store.clone(), gateway.clone(), payment_config.clone()),
            verifier: PaymentVerificationService::new(
                store.clone(),
                gateway.clone(),
                notifier.clone(),
                RewardPolicy::default(),
                &gateway_config,
                &payment_config,
            ),
            refunds: RefundService::new(
                store.clone(),
                notifier.clone(),
                RewardPolicy::default(),
                payment_config.transaction_timeout(),
            ),
            store,
            gateway,
            notifier,
        }
    }

    /// 新建用户并写入存储
    pub async fn user(&self, name: &str, referral_code: &str) -> User {
        let user = User::new(
            format!("{}@studyhub.test", name.to_lowercase()),
            name,
            referral_code,
        );
        self.store.insert_user(user.clone()).await;
        user
    }

    /// 随机姓名的付款用户，推荐码按序号生成
    pub async fn payer(&self, n: usize) -> User {
        let name: String = Name().fake();
        let user = User::new(format!("payer{}@studyhub.test", n), name, code("PAY", n));
        self.store.insert_user(user.clone()).await;
        user
    }

    /// 下单并返回网关订单号
    pub async fn order(&self, user: &User, amount: i64, referral_code: Option<&str>) -> String {
        self.orders
            .create_order(CreateOrderInput {
                user_id: user.id,
                amount,
                currency: None,
                referral_code: referral_code.map(str::to_string),
            })
            .await
            .expect("create order")
            .gateway_order_id
    }

    /// 网关扣款并生成合法回调
    pub fn capture(&self, gateway_order_id: &str, amount: i64) -> PaymentCallback {
        let (payment_id, signature) = self.gateway.capture(gateway_order_id, amount);
        PaymentCallback {
            gateway_order_id: gateway_order_id.to_string(),
            payment_id,
            signature,
        }
    }

    /// 下单、扣款、验证一条龙
    pub async fn pay(&self, user: &User, amount: i64, referral_code: Option<&str>) {
        let order_id = self.order(user, amount, referral_code).await;
        let callback = self.capture(&order_id, amount);
        self.verifier
            .verify_payment(user.id, &callback)
            .await
            .expect("verify payment");
    }
}

/// 生成唯一推荐码
pub fn code(prefix: &str, n: usize) -> String {
    format!("{}{:04}", prefix, n)
}
