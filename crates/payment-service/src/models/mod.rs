//! 数据模型模块
//!
//! 订单、用户、推荐、退款与审计日志实体，以及对应的状态枚举

mod audit;
mod enums;
mod order;
mod referral;
mod user;

pub use audit::*;
pub use enums::*;
pub use order::*;
pub use referral::*;
pub use user::*;
