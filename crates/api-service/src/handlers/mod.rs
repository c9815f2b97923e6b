//! HTTP 请求处理器

pub mod payment;
pub mod referral;
pub mod webhook;
