//! 通知服务
//!
//! 按通知声明的渠道并行发送，单渠道失败不影响其他渠道。

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use sqlx::PgPool;

use super::channels::{EmailChannel, InAppChannel, NotificationChannel};
use super::types::{ChannelResult, Notification, NotificationResult};
use crate::config::NotificationConfig;
use crate::error::Result;

/// 通知服务
#[derive(Default)]
pub struct NotificationService {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置组装渠道：邮件总是启用，站内通知需要数据库连接
    pub fn from_config(config: &NotificationConfig, pool: Option<PgPool>) -> Result<Self> {
        let mut service = Self::new();
        service.register_channel(Arc::new(EmailChannel::new(config)?));

        match pool {
            Some(pool) if config.in_app_enabled => {
                service.register_channel(Arc::new(InAppChannel::new(pool)));
            }
            _ => info!("站内通知渠道未启用"),
        }

        Ok(service)
    }

    /// 注册通知渠道
    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "注册通知渠道");
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 发送通知
    #[instrument(
        skip(self, notification),
        fields(
            notification_id = %notification.notification_id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str()
        )
    )]
    pub async fn send(&self, notification: Notification) -> NotificationResult {
        let targets: Vec<_> = self
            .channels
            .iter()
            .filter(|c| notification.channels.contains(&c.kind()))
            .cloned()
            .collect();

        if targets.is_empty() {
            warn!("没有匹配的通知渠道");
        }

        let results = join_all(targets.iter().map(|channel| {
            let notification = &notification;
            async move {
                match channel.send(notification).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(channel = channel.name(), error = %e, "渠道发送异常");
                        ChannelResult::failed(channel.kind(), e.to_string())
                    }
                }
            }
        }))
        .await;

        NotificationResult {
            notification_id: notification.notification_id,
            channel_results: results,
        }
    }
}
