//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::{handlers, state::AppState};

/// 构建规则管理路由
///
/// 包含规则 CRUD、启停、版本历史和批量导入
fn rule_routes() -> Router<AppState> {
    Router::new()
        .route("/rules", post(handlers::rule::create_rule))
        .route("/rules", get(handlers::rule::list_rules))
        .route("/rules/{id}", get(handlers::rule::get_rule))
        .route("/rules/{id}", put(handlers::rule::update_rule))
        .route("/rules/{id}", delete(handlers::rule::delete_rule))
        .route("/rules/{id}/toggle", patch(handlers::rule::toggle_rule))
        .route("/rules/{id}/versions", get(handlers::rule::list_versions))
        .route("/rules/bulk-upload", post(handlers::rule::bulk_upload))
}

/// 构建运行管理路由
///
/// 包含运行执行、列表、详情和统计
fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", post(handlers::run::execute_run))
        .route("/runs", get(handlers::run::list_runs))
        .route("/runs/{id}", get(handlers::run::get_run))
        .route("/runs/{id}/stats", get(handlers::run::run_stats))
}

/// 构建标记复核路由
///
/// 包含被标记报销的查询、复核和全局统计
fn fraud_routes() -> Router<AppState> {
    Router::new()
        .route("/fraud/flagged", get(handlers::fraud::list_flagged))
        .route(
            "/fraud/flagged/{id}/review",
            patch(handlers::fraud::review_flag),
        )
        .route("/fraud/stats", get(handlers::fraud::fraud_stats))
}

/// 构建完整的 API 路由
///
/// 返回全部业务路由（不含前缀，由调用方在 main.rs 中挂载到 /api/v1）
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(rule_routes())
        .merge(run_routes())
        .merge(fraud_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_construction() {
        let _rule = rule_routes();
        let _run = run_routes();
        let _fraud = fraud_routes();
        let _api = api_routes();
    }
}
