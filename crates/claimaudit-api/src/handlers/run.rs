//! 运行 API 处理器
//!
//! 批次执行是 CPU 密集的同步工作，放到阻塞线程池执行，
//! 墙钟预算由引擎在规则边界检查，超时运行转 FAILED。

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use fraud_engine::FlagFilter;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse, ExecuteRunRequest, PageResponse, RunDetailDto, RunDto,
        request::PaginationParams,
    },
    error::{ApiError, Result},
    state::AppState,
};

/// 执行一次运行：对请求体中的报销批次应用全部活跃规则
///
/// POST /api/v1/runs
pub async fn execute_run(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRunRequest>,
) -> Result<Json<ApiResponse<RunDetailDto>>> {
    if req.claims.len() > state.run_config.max_batch_size {
        return Err(ApiError::BatchTooLarge {
            size: req.claims.len(),
            limit: state.run_config.max_batch_size,
        });
    }

    let orchestrator = state.orchestrator.clone();
    let timeout = Duration::from_secs(state.run_config.timeout_seconds);
    let job_id = req.job_id;
    let claims = req.claims;

    info!(?job_id, claims = claims.len(), "开始执行运行");
    let run = tokio::task::spawn_blocking(move || {
        orchestrator.execute(job_id, &claims, Some(timeout))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("运行任务崩溃: {}", e)))??;

    Ok(Json(ApiResponse::success(detail(&state, run.id)?)))
}

/// 运行列表，最新在前
///
/// GET /api/v1/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<RunDto>>>> {
    let runs = state.runs.list();
    let (page, total) = pagination.slice(&runs);
    let items = page.into_iter().map(RunDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page,
        pagination.page_size,
    ))))
}

/// 运行详情：统计 + 应用的规则版本清单 + 标记分布
///
/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunDetailDto>>> {
    Ok(Json(ApiResponse::success(detail(&state, id)?)))
}

/// 运行范围内的标记聚合统计
///
/// GET /api/v1/runs/{id}/stats
pub async fn run_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<fraud_engine::FlagStats>>> {
    // 先确认运行存在，避免对未知 id 返回空统计
    state.runs.get(id)?;
    let stats = state.recorder.stats(&FlagFilter {
        run_id: Some(id),
        ..Default::default()
    });
    Ok(Json(ApiResponse::success(stats)))
}

fn detail(state: &AppState, run_id: Uuid) -> Result<RunDetailDto> {
    let run = state.runs.get(run_id)?;
    let applications = state.runs.applications(run_id);
    let stats = state.recorder.stats(&FlagFilter {
        run_id: Some(run_id),
        ..Default::default()
    });
    Ok(RunDetailDto::new(run, applications, stats))
}
