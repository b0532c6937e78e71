//! 药品报销审计 API 服务入口
//!
//! 启动时尝试从数据库加载规则，数据库不可用时降级为纯内存模式。

use axum::{Router, http::HeaderValue, routing::get};
use claimaudit_api::{handlers, persistence, routes, state::AppState};
use audit_shared::{config::AppConfig, database::Database, observability};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：config/*.toml + AUDIT_ 前缀环境变量
    let config = AppConfig::load("claimaudit-api").unwrap_or_default();
    observability::init(&config.observability)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting claimaudit-api on {}", addr);

    let state = AppState::new(config.run.clone());

    // 数据库可选：连接失败或未配置时以空规则库启动
    if config.database.url.is_some() {
        match Database::connect(&config.database).await {
            Ok(db) => match persistence::load_rules(&db, &state.store).await {
                Ok(count) => info!("Loaded {} rules from database", count),
                Err(e) => warn!("Failed to load rules from database: {}, starting with empty store", e),
            },
            Err(e) => warn!("Database connection failed: {}, starting with empty store", e),
        }
    } else {
        info!("No database configured, starting with empty store");
    }

    // CORS 配置：通过 AUDIT_CORS_ORIGINS 环境变量控制允许的来源
    let allowed_origins =
        std::env::var("AUDIT_CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
    let cors = if allowed_origins == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = Router::new()
        .nest("/api/v1", routes::api_routes())
        .route("/health", get(handlers::health::health_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    // 优雅关闭：停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// 监听关闭信号：SIGTERM 或 Ctrl+C 任一到达即触发优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
