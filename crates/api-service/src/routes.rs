//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post},
};

use studyhub_payment::PaymentStore;

use crate::{handlers, middleware::auth_middleware, state::AppState};

/// 支付相关路由
pub fn payment_routes<S: PaymentStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/payment/create-order", post(handlers::payment::create_order::<S>))
        .route("/payment/verify", post(handlers::payment::verify_payment::<S>))
        .route("/payment/failed", post(handlers::payment::mark_order_failed::<S>))
        .route(
            "/payment/orders/{gateway_order_id}",
            get(handlers::payment::get_order::<S>),
        )
        // 由网关签名保护，认证中间件放行
        .route("/payment/webhook", post(handlers::webhook::payment_webhook::<S>))
}

/// 推荐与退款路由
pub fn referral_routes<S: PaymentStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/referrals/request-refund",
            post(handlers::referral::request_refund::<S>),
        )
        .route("/referrals/summary", get(handlers::referral::referral_summary::<S>))
}

/// 构建 `/api` 下的全部路由并挂载认证中间件
///
/// 返回的 Router 已绑定状态，可直接与健康检查等路由合并。
pub fn build_router<S: PaymentStore>(state: AppState<S>) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(payment_routes::<S>())
                .merge(referral_routes::<S>()),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<S>,
        ))
        .with_state(state)
}
