//! 认证模块
//!
//! 只做 Token 校验；生成方法供测试与本地调试使用

mod jwt;

pub use jwt::{Claims, JwtConfig, JwtManager};
