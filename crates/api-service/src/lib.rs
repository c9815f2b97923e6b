//! 学习平台支付 API 服务
//!
//! 对外暴露下单、支付验证、Webhook 与推荐退款接口，业务逻辑位于
//! `studyhub-payment-service`，本 crate 只负责 HTTP 适配。
//!
//! ## 模块结构
//!
//! - `auth`: JWT 校验（Token 由外部登录服务签发）
//! - `middleware`: 认证中间件
//! - `dto`: 请求与响应体
//! - `error`: 业务错误到 HTTP 状态码的映射
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use dto::ApiResponse;
pub use error::{ApiError, Result};
pub use state::AppState;
