//! 支付网关 Webhook 处理器
//!
//! 不经过 Bearer 认证，签名覆盖原始请求体，因此直接读取 `Bytes`。

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use studyhub_payment::{PaymentError, PaymentStore, WebhookOutcome};

use crate::{
    dto::{ApiResponse, WebhookAck},
    error::Result,
    state::AppState,
};

/// 网关签名头
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// 接收网关事件
///
/// POST /api/payment/webhook
pub async fn payment_webhook<S: PaymentStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(PaymentError::Unauthorized)?;

    let ack = match state.verifier.handle_webhook(&body, signature).await? {
        WebhookOutcome::Processed(outcome) => WebhookAck {
            processed: true,
            event: None,
            already_processed: Some(outcome.is_already_processed()),
        },
        WebhookOutcome::Ignored { event } => WebhookAck {
            processed: false,
            event: Some(event),
            already_processed: None,
        },
    };

    Ok(Json(ApiResponse::success(ack)))
}
