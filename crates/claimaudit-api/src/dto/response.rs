//! 响应 DTO 定义
//!
//! 所有 REST API 的响应体结构，统一 {success, code, message, data} 信封。

use chrono::{DateTime, Utc};
use fraud_engine::{
    Flag, FlagStats, Rule, RuleApplication, RuleCategory, RuleVersion, Run, RunStatus, Severity,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: usize, page: usize, page_size: usize) -> Self {
        let total_pages = if page_size > 0 {
            total.div_ceil(page_size)
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// 规则响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDto {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    pub is_active: bool,
    pub version: u32,
    pub rule_definition: Value,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Rule> for RuleDto {
    fn from(rule: Rule) -> Self {
        // 定义由引擎校验过，序列化不会失败
        let rule_definition =
            serde_json::to_value(&rule.rule_definition).unwrap_or(Value::Null);
        Self {
            id: rule.id,
            code: rule.code,
            name: rule.name,
            description: rule.description,
            category: rule.category,
            severity: rule.severity,
            is_active: rule.is_active,
            version: rule.version,
            rule_definition,
            created_by: rule.created_by,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

/// 规则版本快照 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVersionDto {
    pub rule_id: Uuid,
    pub version: u32,
    pub rule_definition: Value,
    pub category: RuleCategory,
    pub severity: Severity,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RuleVersion> for RuleVersionDto {
    fn from(v: RuleVersion) -> Self {
        let rule_definition = serde_json::to_value(&v.rule_definition).unwrap_or(Value::Null);
        Self {
            rule_id: v.rule_id,
            version: v.version,
            rule_definition,
            category: v.category,
            severity: v.severity,
            is_active: v.is_active,
            created_by: v.created_by,
            created_at: v.created_at,
        }
    }
}

/// 批量导入结果 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadDto {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// 运行响应 DTO
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDto {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub status: RunStatus,
    pub claims_processed: u64,
    pub rules_executed: u64,
    pub flags_generated: u64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Run> for RunDto {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            job_id: run.job_id,
            status: run.status,
            claims_processed: run.claims_processed,
            rules_executed: run.rules_executed,
            flags_generated: run.flags_generated,
            error_message: run.error_message,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }
    }
}

/// 运行详情：应用的规则版本清单 + 标记分布
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetailDto {
    #[serde(flatten)]
    pub run: RunDto,
    pub rules_applied: Vec<RuleApplication>,
    pub flags_by_severity: std::collections::BTreeMap<String, u64>,
    pub flags_by_category: std::collections::BTreeMap<String, u64>,
    pub flags_by_rule: std::collections::BTreeMap<String, u64>,
}

impl RunDetailDto {
    pub fn new(run: Run, rules_applied: Vec<RuleApplication>, stats: FlagStats) -> Self {
        Self {
            run: run.into(),
            rules_applied,
            flags_by_severity: stats.by_severity,
            flags_by_category: stats.by_category,
            flags_by_rule: stats.by_rule,
        }
    }
}

/// 标记响应 DTO：复核状态摊平为 reviewed/reviewerNotes/reviewedAt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDto {
    pub id: Uuid,
    pub run_id: Uuid,
    pub job_id: Option<Uuid>,
    pub claim_number: String,
    pub rule_id: Uuid,
    pub rule_code: String,
    pub rule_name: String,
    pub rule_version: u32,
    pub severity: Severity,
    pub category: RuleCategory,
    pub explanation: Value,
    pub flagged_at: DateTime<Utc>,
    pub reviewed: bool,
    pub reviewer_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<Flag> for FlagDto {
    fn from(flag: Flag) -> Self {
        let reviewed = flag.review.is_reviewed();
        let reviewer_notes = flag.review.notes().map(|s| s.to_string());
        let reviewed_at = flag.review.reviewed_at();
        Self {
            id: flag.id,
            run_id: flag.run_id,
            job_id: flag.job_id,
            claim_number: flag.claim_number,
            rule_id: flag.rule_id,
            rule_code: flag.rule_code,
            rule_name: flag.rule_name,
            rule_version: flag.rule_version,
            severity: flag.severity,
            category: flag.category,
            explanation: flag.explanation,
            flagged_at: flag.flagged_at,
            reviewed,
            reviewer_notes,
            reviewed_at,
        }
    }
}
