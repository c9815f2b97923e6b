//! 支付服务错误类型
//!
//! `AlreadyProcessed` 不是错误：重复回调作为成功结果返回，见 `VerificationOutcome`。

use thiserror::Error;
use uuid::Uuid;

use crate::models::OrderStatus;

/// 支付服务错误
#[derive(Debug, Error)]
pub enum PaymentError {
    // ==================== 请求错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("支付签名无效")]
    Unauthorized,

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("用户不存在: {0}")]
    UserNotFound(Uuid),

    // ==================== 业务错误 ====================
    #[error("不满足退款条件: {0}")]
    NotEligible(String),

    #[error("支付尚未扣款: payment_id={payment_id}, status={status}")]
    PaymentNotCaptured { payment_id: String, status: String },

    #[error("支付数据不一致: {0}")]
    IntegrityError(String),

    #[error("订单状态不允许变更: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    // ==================== 基础设施错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储暂时不可用: {0}")]
    TransientStore(String),

    #[error("支付网关错误: {0}")]
    Gateway(String),

    #[error("支付网关拒绝请求: status={status}, {message}")]
    GatewayRejected { status: u16, message: String },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, PaymentError>;

impl PaymentError {
    /// 稳定的错误码，供 API 层返回给客户端
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized => "INVALID_SIGNATURE",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::NotEligible(_) => "NOT_ELIGIBLE",
            Self::PaymentNotCaptured { .. } => "PAYMENT_NOT_CAPTURED",
            Self::IntegrityError(_) => "PAYMENT_INTEGRITY_ERROR",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::TransientStore(_) => "STORE_UNAVAILABLE",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::GatewayRejected { .. } => "GATEWAY_REJECTED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 重试安全：验证流程以订单终态作为幂等保护
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => !matches!(
                e,
                sqlx::Error::RowNotFound | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)
            ),
            Self::TransientStore(_) | Self::Gateway(_) => true,
            _ => false,
        }
    }

    /// 是否为业务错误（由调用方输入或数据状态引起，而非系统故障）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Unauthorized
                | Self::OrderNotFound(_)
                | Self::UserNotFound(_)
                | Self::NotEligible(_)
                | Self::PaymentNotCaptured { .. }
                | Self::InvalidTransition { .. }
        )
    }
}
