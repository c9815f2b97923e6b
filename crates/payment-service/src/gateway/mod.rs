//! 支付网关客户端
//!
//! 下单时在网关创建远端订单，验证时拉取权威的支付详情用于金额比对。
//! 网关调用总是在存储事务之外执行，避免持锁等待外部网络。

mod memory;
mod razorpay;

pub use memory::InMemoryGateway;
pub use razorpay::RazorpayGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// 创建远端订单请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteOrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    /// 透传给网关的附加信息（用户 ID、推荐码等）
    pub notes: HashMap<String, String>,
}

/// 网关返回的订单
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteOrder {
    /// 网关订单号
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// 网关侧支付状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    /// 资金已被网关确认（授权或扣款）
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Authorized | Self::Captured)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

/// 网关返回的支付详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    /// 支付所属的网关订单号
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: GatewayPaymentStatus,
}

/// 支付网关接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 返回给前端的公开 key id
    fn key_id(&self) -> String;

    async fn create_remote_order(&self, request: &RemoteOrderRequest) -> Result<RemoteOrder>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment>;
}
