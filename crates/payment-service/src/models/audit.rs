//! 审计日志实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AuditAction;

/// 审计日志（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    #[sqlx(default)]
    pub user_id: Option<Uuid>,
    #[sqlx(default)]
    pub order_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 新建审计日志参数
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, details: serde_json::Value) -> Self {
        Self {
            action,
            user_id: None,
            order_id: None,
            details,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::now_v7(),
            action: self.action,
            user_id: self.user_id,
            order_id: self.order_id,
            details: self.details,
            created_at: now,
        }
    }
}
