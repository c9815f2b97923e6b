//! 通知发送器
//!
//! 业务服务在事务提交后调用，通知在后台任务中发送（fire-and-forget），
//! 失败只记录日志，不回传给调用方。

use std::sync::Arc;

use tracing::{error, info, warn};

use super::PaymentNotifier;
use super::service::NotificationService;
use super::types::{Notification, NotificationBuilder};
use crate::models::User;

/// 通知发送器
#[derive(Clone)]
pub struct NotificationSender {
    service: Arc<NotificationService>,
    currency: String,
}

impl NotificationSender {
    pub fn new(service: Arc<NotificationService>, currency: impl Into<String>) -> Self {
        Self {
            service,
            currency: currency.into(),
        }
    }

    fn send_async(&self, notification: Notification) {
        let service = self.service.clone();

        // 没有运行时（如同步测试）时直接丢弃
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(notification_id = %notification.notification_id, "无 tokio 运行时，通知未发送");
            return;
        };

        handle.spawn(async move {
            let notification_id = notification.notification_id;
            let user_id = notification.user_id;
            let kind = notification.kind.as_str();
            let result = service.send(notification).await;

            if result.all_succeeded() {
                info!(%notification_id, %user_id, kind, "通知发送成功");
            } else if result.success_count() > 0 {
                warn!(
                    %notification_id,
                    %user_id,
                    kind,
                    failure_count = result.failure_count(),
                    "通知部分发送成功"
                );
            } else {
                error!(%notification_id, %user_id, kind, "通知发送失败");
            }
        });
    }
}

impl PaymentNotifier for NotificationSender {
    fn send_payment_success_notice(&self, user: &User, amount: i64) {
        self.send_async(NotificationBuilder::payment_success(user, amount, &self.currency));
    }

    fn send_milestone_notice(&self, user: &User, referral_count: i32) {
        self.send_async(NotificationBuilder::referral_milestone(user, referral_count));
    }

    fn send_refund_processing_notice(&self, user: &User, amount: i64) {
        self.send_async(NotificationBuilder::refund_processing(user, amount, &self.currency));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_without_channels_does_not_panic() {
        let sender = NotificationSender::new(Arc::new(NotificationService::new()), "INR");
        let user = User::new("a@studyhub.test", "Asha", "AB12CD");

        sender.send_payment_success_notice(&user, 49_900);
        sender.send_milestone_notice(&user, 20);
        sender.send_refund_processing_notice(&user, 49_900);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[test]
    fn test_send_outside_runtime_is_dropped() {
        let sender = NotificationSender::new(Arc::new(NotificationService::new()), "INR");
        let user = User::new("a@studyhub.test", "Asha", "AB12CD");
        sender.send_payment_success_notice(&user, 100);
    }
}
