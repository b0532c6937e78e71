//! 规则管理 API 处理器
//!
//! 规则的 CRUD、启停、版本历史与批量导入。所有写操作经由版本存储，
//! 每次定义变更自动产生不可变版本快照。

use axum::{
    Json,
    extract::{Path, Query, State},
};
use fraud_engine::RuleFilter;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse, BulkUploadDto, CreateRuleRequest, PageResponse, RuleDto, RuleListParams,
        RuleVersionDto, UpdateRuleRequest,
    },
    error::Result,
    state::AppState,
};

/// 创建规则
///
/// POST /api/v1/rules
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<ApiResponse<RuleDto>>> {
    let spec = req.into_spec()?;
    let rule = state.store.create(spec, None)?;
    info!(rule_id = %rule.id, code = %rule.code, "规则已创建");
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 规则列表（分页 + 过滤）
///
/// GET /api/v1/rules
pub async fn list_rules(
    State(state): State<AppState>,
    Query(params): Query<RuleListParams>,
) -> Result<Json<ApiResponse<PageResponse<RuleDto>>>> {
    let filter = RuleFilter {
        category: params.category,
        severity: params.severity,
        is_active: params.is_active,
    };
    let rules = state.store.list(&filter);
    let pagination = params.pagination();
    let (page, total) = pagination.slice(&rules);
    let items = page.into_iter().map(RuleDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page,
        pagination.page_size,
    ))))
}

/// 规则详情
///
/// GET /api/v1/rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RuleDto>>> {
    let rule = state.store.get(id)?;
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 更新规则（产生新版本）
///
/// PUT /api/v1/rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<ApiResponse<RuleDto>>> {
    let (spec, expected_version) = req.into_spec()?;
    let rule = state.store.update(id, spec, expected_version, None)?;
    info!(rule_id = %id, version = rule.version, "规则已更新");
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 切换规则启用状态
///
/// PATCH /api/v1/rules/{id}/toggle
pub async fn toggle_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RuleDto>>> {
    let current = state.store.get(id)?;
    let rule = state.store.set_active(id, !current.is_active, None)?;
    info!(rule_id = %id, is_active = rule.is_active, "规则状态已切换");
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 软删除规则（停用，历史保留）
///
/// DELETE /api/v1/rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RuleDto>>> {
    let rule = state.store.soft_delete(id, None)?;
    info!(rule_id = %id, "规则已软删除");
    Ok(Json(ApiResponse::success(rule.into())))
}

/// 版本历史，新版本在前
///
/// GET /api/v1/rules/{id}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<RuleVersionDto>>>> {
    let versions = state.store.versions(id)?;
    let items = versions.into_iter().map(RuleVersionDto::from).collect();
    Ok(Json(ApiResponse::success(items)))
}

/// 批量导入：JSON 数组，逐条独立校验，坏条目计入 failed 不中断其余
///
/// POST /api/v1/rules/bulk-upload
pub async fn bulk_upload(
    State(state): State<AppState>,
    Json(requests): Json<Vec<CreateRuleRequest>>,
) -> Result<Json<ApiResponse<BulkUploadDto>>> {
    // 解析失败的条目在入库前就计入 failed，解析成功的交给存储批量创建
    let mut parse_failed = 0;
    let mut errors = Vec::new();
    let mut specs = Vec::with_capacity(requests.len());

    for req in requests {
        let code = req.code.clone();
        match req.into_spec() {
            Ok(spec) => specs.push(spec),
            Err(e) => {
                parse_failed += 1;
                errors.push(format!("{}: {}", code, e));
            }
        }
    }

    let mut outcome = state.store.bulk_create(specs, None);
    outcome.failed += parse_failed;
    outcome.errors.extend(errors);

    info!(created = outcome.created, failed = outcome.failed, "批量导入完成");
    Ok(Json(ApiResponse::success_with_message(
        BulkUploadDto {
            created: outcome.created,
            failed: outcome.failed,
            errors: outcome.errors,
        },
        format!("导入 {} 条，失败 {} 条", outcome.created, outcome.failed),
    )))
}
