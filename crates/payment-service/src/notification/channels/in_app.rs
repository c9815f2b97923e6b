//! 站内通知渠道
//!
//! 写入 `user_notifications` 表，由前端轮询展示。

use async_trait::async_trait;
use sqlx::PgPool;

use super::NotificationChannel;
use crate::error::Result;
use crate::notification::types::{ChannelKind, ChannelResult, Notification};

/// 站内通知渠道
pub struct InAppChannel {
    pool: PgPool,
}

impl InAppChannel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    fn name(&self) -> &str {
        "InApp"
    }

    async fn send(&self, notification: &Notification) -> Result<ChannelResult> {
        let data = serde_json::to_value(&notification.data)?;

        let result = sqlx::query(
            r#"
            INSERT INTO user_notifications (id, user_id, kind, title, body, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.notification_id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(data)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await;

        Ok(match result {
            Ok(_) => ChannelResult::success(ChannelKind::InApp, notification.notification_id.to_string()),
            Err(e) => ChannelResult::failed(ChannelKind::InApp, e.to_string()),
        })
    }
}
