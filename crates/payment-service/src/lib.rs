//! 支付验证与推荐奖励引擎
//!
//! 将网关异步确认的支付事件转换为一组一致、不可逆的状态变更：
//! 订单完成、用户升级、推荐奖励与退款资格，全部在单个存储事务中提交，
//! 通知等副作用仅在提交成功后发出。
//!
//! ## 模块结构
//!
//! - `signature`: 网关回调 / Webhook 的 HMAC-SHA256 签名校验
//! - `policy`: 推荐奖励与里程碑计算（纯函数）
//! - `store`: 事务化存储抽象（PostgreSQL 与内存实现）
//! - `gateway`: 支付网关客户端
//! - `notification`: 提交后的异步通知
//! - `service`: 下单、支付验证协调、退款申请

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notification;
pub mod policy;
pub mod service;
pub mod signature;
pub mod store;

pub use error::{PaymentError, Result};
pub use gateway::{GatewayPayment, InMemoryGateway, PaymentGateway, RazorpayGateway};
pub use models::*;
pub use notification::{NotificationSender, NotificationService, PaymentNotifier};
pub use policy::RewardPolicy;
pub use service::verification_service::WebhookOutcome;
pub use service::{
    CreateOrderInput, CreatedOrder, OrderService, PaymentCallback, PaymentReceipt,
    PaymentVerificationService, ReferralResult, ReferralSummary, RefundService,
    VerificationOutcome,
};
pub use store::{FailPoint, MemoryPaymentStore, PaymentStore, PaymentTx, PgPaymentStore};
