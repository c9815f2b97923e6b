//! Email 邮件通知渠道
//!
//! 以 JSON 调用 HTTP 邮件服务（SendGrid / SES 网关一类）。
//! 未配置端点时只记录日志并视为成功，便于本地开发。

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::NotificationChannel;
use crate::config::NotificationConfig;
use crate::error::{PaymentError, Result};
use crate::notification::types::{ChannelKind, ChannelResult, Notification};

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Email 邮件通知渠道
pub struct EmailChannel {
    client: Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    from_address: String,
    from_name: String,
}

impl EmailChannel {
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PaymentError::Internal(format!("构建邮件 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.mail_endpoint.clone(),
            api_key: config.mail_api_key.clone(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn name(&self) -> &str {
        "Email"
    }

    async fn send(&self, notification: &Notification) -> Result<ChannelResult> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            info!(
                notification_id = %notification.notification_id,
                to = %notification.email,
                subject = %notification.title,
                "未配置邮件服务，跳过实际发送"
            );
            return Ok(ChannelResult::success(ChannelKind::Email, "skipped"));
        };

        if notification.email.is_empty() {
            warn!(notification_id = %notification.notification_id, "用户没有邮箱地址");
            return Ok(ChannelResult::failed(ChannelKind::Email, "missing email address"));
        }

        let request = MailRequest {
            from: format!("{} <{}>", self.from_name, self.from_address),
            to: &notification.email,
            subject: &notification.title,
            text: &notification.body,
        };

        let mut builder = self.client.post(endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(notification_id = %notification.notification_id, "Email 发送中...");

        match builder.send().await {
            Ok(response) if response.status().is_success() => Ok(ChannelResult::success(
                ChannelKind::Email,
                notification.notification_id.to_string(),
            )),
            Ok(response) => Ok(ChannelResult::failed(
                ChannelKind::Email,
                format!("mail service returned {}", response.status()),
            )),
            Err(e) => Ok(ChannelResult::failed(ChannelKind::Email, e.to_string())),
        }
    }
}
