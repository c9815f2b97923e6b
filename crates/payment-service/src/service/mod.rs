//! 服务层
//!
//! - `order_service`: 下单、失败上报与订单查询
//! - `verification_service`: 支付验证事务协调（含推荐奖励与里程碑）
//! - `refund_service`: 退款申请与推荐概览

pub mod dto;
pub mod order_service;
pub mod refund_service;
pub mod verification_service;

pub use dto::*;
pub use order_service::OrderService;
pub use refund_service::RefundService;
pub use verification_service::PaymentVerificationService;
