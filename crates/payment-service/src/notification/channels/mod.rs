//! 通知渠道实现
//!
//! - **Email**: 通过 HTTP 邮件服务发送
//! - **InApp**: 写入站内通知表

mod email;
mod in_app;

pub use email::EmailChannel;
pub use in_app::InAppChannel;

use async_trait::async_trait;

use super::types::{ChannelKind, ChannelResult, Notification};
use crate::error::Result;

/// 通知渠道 trait
///
/// 发送失败应返回 `ChannelResult::failed` 而非 `Err`，
/// `Err` 只用于渠道自身的异常（如序列化失败）。
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<ChannelResult>;
}
