//! 支付 API 处理器
//!
//! 下单、支付验证与失败上报。调用方身份一律取自 Token，请求体中的用户信息不被信任。

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;
use validator::Validate;

use studyhub_payment::{
    CreateOrderInput, CreatedOrder, PaymentCallback, PaymentError, PaymentOrder, PaymentStore,
};
use studyhub_shared::retry::retry_with_policy;

use crate::{
    auth::Claims,
    dto::{
        ApiResponse, CreateOrderRequest, MarkOrderFailedRequest, VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    error::Result,
    state::AppState,
};

/// 创建支付订单
///
/// POST /api/payment/create-order
pub async fn create_order<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<CreatedOrder>>> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let created = state
        .orders
        .create_order(CreateOrderInput {
            user_id,
            amount: req.amount,
            currency: req.currency,
            referral_code: req.referral_code,
        })
        .await?;

    Ok(Json(ApiResponse::success(created)))
}

/// 验证支付
///
/// POST /api/payment/verify
///
/// 瞬时错误（事务超时、连接池耗尽、网关抖动）按配置重试，验证本身幂等。
pub async fn verify_payment<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let callback = PaymentCallback {
        gateway_order_id: req.gateway_order_id,
        payment_id: req.payment_id,
        signature: req.signature,
    };
    let verifier = &state.verifier;

    let outcome = retry_with_policy(
        &state.retry_policy,
        "verify_payment",
        PaymentError::is_retryable,
        || verifier.verify_payment(user_id, &callback),
    )
    .await?;

    let message = if outcome.is_already_processed() {
        "支付已处理"
    } else {
        "支付验证成功"
    };
    info!(
        %user_id,
        gateway_order_id = %callback.gateway_order_id,
        outcome = outcome.label(),
        "支付验证完成"
    );

    Ok(Json(ApiResponse::success_with_message(
        VerifyPaymentResponse::from(outcome),
        message,
    )))
}

/// 上报支付失败或取消
///
/// POST /api/payment/failed
pub async fn mark_order_failed<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkOrderFailedRequest>,
) -> Result<Json<ApiResponse<PaymentOrder>>> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let order = state
        .orders
        .mark_order_failed(user_id, &req.gateway_order_id, req.status, req.reason)
        .await?;

    Ok(Json(ApiResponse::success(order)))
}

/// 查询订单
///
/// GET /api/payment/orders/{gateway_order_id}
pub async fn get_order<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
    Path(gateway_order_id): Path<String>,
) -> Result<Json<ApiResponse<PaymentOrder>>> {
    let user_id = claims.user_id()?;
    let order = state.orders.get_order(user_id, &gateway_order_id).await?;
    Ok(Json(ApiResponse::success(order)))
}
