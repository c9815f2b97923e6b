//! 通知模块
//!
//! 支付成功、推荐里程碑与退款受理三类通知，均在事务提交之后异步发出。

pub mod channels;
pub mod sender;
pub mod service;
pub mod types;

pub use channels::{EmailChannel, InAppChannel, NotificationChannel};
pub use sender::NotificationSender;
pub use service::NotificationService;
pub use types::{ChannelKind, Notification, NotificationBuilder, NotificationKind};

use crate::models::User;

/// 支付流程使用的通知接口
///
/// 方法是同步的：实现方负责在后台发送，调用方不等待结果。
#[cfg_attr(test, mockall::automock)]
pub trait PaymentNotifier: Send + Sync {
    fn send_payment_success_notice(&self, user: &User, amount: i64);

    fn send_milestone_notice(&self, user: &User, referral_count: i32);

    fn send_refund_processing_notice(&self, user: &User, amount: i64);
}
