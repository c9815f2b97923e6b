//! 推荐与退款 API 处理器

use axum::{Extension, Json, extract::State};

use studyhub_payment::{PaymentStore, ReferralSummary};

use crate::{
    auth::Claims,
    dto::{ApiResponse, RefundResponse},
    error::Result,
    state::AppState,
};

/// 申请推荐里程碑退款
///
/// POST /api/referrals/request-refund
pub async fn request_refund<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RefundResponse>>> {
    let user_id = claims.user_id()?;
    let refund = state.refunds.request_refund(user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        RefundResponse { refund },
        "退款申请已受理",
    )))
}

/// 推荐概览
///
/// GET /api/referrals/summary
pub async fn referral_summary<S: PaymentStore>(
    State(state): State<AppState<S>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<ReferralSummary>>> {
    let user_id = claims.user_id()?;
    let summary = state.refunds.referral_summary(user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}
