//! 健康检查处理器

use axum::Json;
use serde_json::{Value, json};

/// 存活探针：服务进程正常即返回 ok
///
/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "claimaudit-api"
    }))
}
