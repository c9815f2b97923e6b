//! Razorpay REST 客户端
//!
//! 使用 key_id / key_secret 做 HTTP Basic 鉴权。
//! 5xx 与网络错误视为可重试的 `Gateway`，4xx 视为不可重试的 `GatewayRejected`。

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{GatewayPayment, PaymentGateway, RemoteOrder, RemoteOrderRequest};
use crate::config::GatewayConfig;
use crate::error::{PaymentError, Result};

/// Razorpay 网关客户端
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PaymentError::Internal(format!("构建网关 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Gateway(format!("解析网关响应失败: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(status = status.as_u16(), body = %body, "网关暂时不可用");
            Err(PaymentError::Gateway(format!("HTTP {}", status.as_u16())))
        } else {
            warn!(status = status.as_u16(), body = %body, "网关拒绝请求");
            Err(PaymentError::GatewayRejected {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

fn transport_error(e: reqwest::Error) -> PaymentError {
    PaymentError::Gateway(format!("网关请求失败: {}", e))
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_remote_order(&self, request: &RemoteOrderRequest) -> Result<RemoteOrder> {
        debug!("创建网关订单");

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse(response).await
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(transport_error)?;

        Self::parse(response).await
    }
}
