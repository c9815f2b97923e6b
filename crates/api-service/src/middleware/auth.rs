//! JWT 认证中间件
//!
//! 验证请求中的 Bearer Token 并将 Claims 注入请求扩展

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use studyhub_payment::PaymentStore;

use crate::state::AppState;

/// 无需 Bearer 认证的路径，Webhook 由网关签名保护
const PUBLIC_PATHS: [&str; 1] = ["/api/payment/webhook"];

/// 认证中间件
///
/// 从 Authorization header 中提取 Bearer Token，验证后将 Claims 注入请求扩展。
pub async fn auth_middleware<S: PaymentStore>(
    State(state): State<AppState<S>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return next.run(request).await;
    }

    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) if !token.trim().is_empty() => token.trim().to_string(),
        _ => return unauthorized_response("缺少认证 Token"),
    };

    match state.jwt_manager.verify_token(&token) {
        Ok(claims) => {
            if claims.user_id().is_err() {
                return unauthorized_response("Token 中的用户 ID 无效");
            }
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "Token 校验失败");
            unauthorized_response("无效的 Token")
        }
    }
}

/// 生成 401 未授权响应
fn unauthorized_response(message: &str) -> Response {
    let body = json!({
        "success": false,
        "code": "UNAUTHORIZED",
        "message": message,
        "data": null
    });

    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}
