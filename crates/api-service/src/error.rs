//! API 错误类型
//!
//! 业务错误按类型映射 HTTP 状态码；系统级错误只返回通用提示，详细信息记录日志。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use studyhub_payment::PaymentError;

const GENERIC_MESSAGE: &str = "服务内部错误，请稍后重试";

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("未授权: {0}")]
    Unauthorized(String),

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(e) => match e {
                PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
                PaymentError::Unauthorized => StatusCode::UNAUTHORIZED,
                PaymentError::OrderNotFound(_) | PaymentError::UserNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PaymentError::NotEligible(_)
                | PaymentError::PaymentNotCaptured { .. }
                | PaymentError::InvalidTransition { .. } => StatusCode::CONFLICT,
                PaymentError::IntegrityError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::GatewayRejected { .. } => StatusCode::BAD_GATEWAY,
                PaymentError::Database(_)
                | PaymentError::TransientStore(_)
                | PaymentError::Gateway(_) => StatusCode::SERVICE_UNAVAILABLE,
                PaymentError::Serialization(_) | PaymentError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Payment(e) => e.error_code(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                GENERIC_MESSAGE.to_string()
            }
            Self::Payment(e) if !e.is_business_error() => {
                match e {
                    PaymentError::IntegrityError(_) => {
                        // 详情已写入审计，对外不暴露金额
                        "支付数据校验失败，请联系客服".to_string()
                    }
                    PaymentError::GatewayRejected { .. } => {
                        tracing::warn!(error = %e, "支付网关拒绝请求");
                        "支付网关拒绝了请求".to_string()
                    }
                    _ => {
                        tracing::error!(error = %e, retryable = e.is_retryable(), "支付服务错误");
                        GENERIC_MESSAGE.to_string()
                    }
                }
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.client_message();

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// Handler 结果类型别名
pub type Result<T> = std::result::Result<T, ApiError>;
