//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "payment_orders_created_total",
        "Total number of payment orders created"
    );
    metrics::describe_counter!(
        "payment_verifications_total",
        "Total number of payment verification attempts by outcome"
    );
    metrics::describe_histogram!(
        "payment_verification_duration_seconds",
        "Payment verification duration in seconds"
    );
    metrics::describe_counter!("referral_rewards_total", "Total number of referral rewards");
    metrics::describe_counter!(
        "referral_milestones_total",
        "Total number of referrers reaching the refund milestone"
    );
    metrics::describe_counter!(
        "refund_requests_total",
        "Total number of refund requests by outcome"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录订单创建
#[inline]
pub fn record_order_created(currency: &str) {
    metrics::counter!(
        "payment_orders_created_total",
        "currency" => currency.to_string()
    )
    .increment(1);
}

/// 记录支付验证结果
///
/// outcome 取值：completed / already_processed / rejected / integrity_failure / not_captured / error
#[inline]
pub fn record_payment_verification(outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "payment_verifications_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "payment_verification_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录推荐奖励发放
#[inline]
pub fn record_referral_reward(milestone_reached: bool) {
    metrics::counter!("referral_rewards_total").increment(1);
    if milestone_reached {
        metrics::counter!("referral_milestones_total").increment(1);
    }
}

/// 记录退款申请结果
#[inline]
pub fn record_refund_request(outcome: &str) {
    metrics::counter!(
        "refund_requests_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("POST", "/api/payment/verify", 200, 0.1);
        record_order_created("INR");
        record_payment_verification("completed", 0.05);
        record_referral_reward(true);
        record_refund_request("accepted");
    }
}
