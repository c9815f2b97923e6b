//! 学习平台支付 API 服务
//!
//! 提供下单、支付验证、网关 Webhook 与推荐退款 REST API。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use studyhub_api::{
    auth::{JwtConfig, JwtManager},
    routes,
    state::AppState,
};
use studyhub_payment::{
    NotificationSender, NotificationService, PgPaymentStore, RazorpayGateway,
    config::PaymentSettings,
};
use studyhub_shared::{
    config::{AppConfig, load_section},
    database::Database,
    observability::{self, middleware as obs_middleware},
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const SERVICE_NAME: &str = "studyhub-api";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_default();
    let _guard = observability::init(&config.observability, &config.service_name).await?;

    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    let settings = PaymentSettings::load(SERVICE_NAME)?;
    let jwt_config: JwtConfig = load_section(SERVICE_NAME, "jwt")?;
    if jwt_config.uses_default_secret() {
        if config.is_production() {
            anyhow::bail!("生产环境必须通过 STUDYHUB_JWT__SECRET 配置 JWT 密钥");
        }
        warn!("Using default JWT secret - set STUDYHUB_JWT__SECRET for production");
    }
    if settings.gateway.uses_default_secrets() {
        if config.is_production() {
            anyhow::bail!("生产环境必须通过 STUDYHUB_GATEWAY__KEY_SECRET 与 STUDYHUB_GATEWAY__WEBHOOK_SECRET 配置网关密钥");
        }
        warn!("Using default gateway secrets - set STUDYHUB_GATEWAY__KEY_SECRET and STUDYHUB_GATEWAY__WEBHOOK_SECRET for production");
    }

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    let store = Arc::new(PgPaymentStore::new(db.pool().clone()));
    let gateway = Arc::new(RazorpayGateway::new(&settings.gateway)?);
    let notifications = Arc::new(NotificationService::from_config(
        &settings.notification,
        Some(db.pool().clone()),
    )?);
    let notifier = Arc::new(NotificationSender::new(
        notifications,
        settings.payment.default_currency.clone(),
    ));

    let state = AppState::new(
        store,
        gateway,
        notifier,
        &settings,
        JwtManager::new(jwt_config),
        config.retry.to_policy(),
    );

    let app = Router::new()
        .merge(routes::build_router(state))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db.clone();
                move || readiness_check(db_for_ready.clone())
            }),
        )
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(&config))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 按 `server.cors_origins` 构建 CORS 层
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let allowed_origins = config.server.cors_origins.trim();

    if allowed_origins == "*" {
        if config.is_production() {
            warn!("cors_origins=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 为所有响应注入 HTTP 安全头
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
    response
}

/// 监听关闭信号（SIGTERM 或 Ctrl+C）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：数据库不可用时返回 503，使实例从负载均衡中摘除
async fn readiness_check(db: Database) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = db.health_check().await.is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "service": SERVICE_NAME,
            "checks": {
                "database": if db_ok { "ok" } else { "fail" }
            }
        })),
    )
}
