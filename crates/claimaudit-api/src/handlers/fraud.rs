//! 标记复核 API 处理器
//!
//! 被标记报销的查询、复核与全局统计。复核是单向操作，
//! 已复核的标记不能撤销也不能二次复核。

use axum::{
    Json,
    extract::{Path, Query, State},
};
use fraud_engine::{FlagFilter, FlagStats};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{ApiResponse, FlagDto, FlagListParams, PageResponse, request::ReviewRequest},
    error::Result,
    state::AppState,
};

/// 被标记报销列表（分页 + 过滤），按 (claim_number, rule_code) 升序
///
/// GET /api/v1/fraud/flagged
pub async fn list_flagged(
    State(state): State<AppState>,
    Query(params): Query<FlagListParams>,
) -> Result<Json<ApiResponse<PageResponse<FlagDto>>>> {
    let pagination = params.pagination();
    let filter = FlagFilter {
        run_id: params.run_id,
        job_id: params.job_id,
        rule_id: params.rule_id,
        severity: params.severity,
        category: params.category,
        reviewed: params.reviewed,
        claim_number: params.claim_number,
    };
    let flags = state.recorder.list(&filter);
    let (page, total) = pagination.slice(&flags);
    let items = page.into_iter().map(FlagDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page,
        pagination.page_size,
    ))))
}

/// 复核标记：附备注，单向转换
///
/// PATCH /api/v1/fraud/flagged/{id}/review
pub async fn review_flag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<FlagDto>>> {
    req.validate()?;
    let flag = state.recorder.review(id, req.notes)?;
    info!(flag_id = %id, "标记已复核");
    Ok(Json(ApiResponse::success(flag.into())))
}

/// 全局标记统计：总量、复核进度、按严重性/分类/规则分布
///
/// GET /api/v1/fraud/stats
pub async fn fraud_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FlagStats>>> {
    let stats = state.recorder.stats(&FlagFilter::default());
    Ok(Json(ApiResponse::success(stats)))
}
