//! 请求 DTO 定义
//!
//! 规则定义以原始 JSON 接收，解析为带标签的和类型时的任何失败
//! （未知 logic_type、缺参、未知字段名）统一映射为 400 INVALID_RULE_DEFINITION。

use fraud_engine::{Claim, RuleCategory, RuleLogic, RuleSpec, Severity};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, Result};

/// 创建规则请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 200, message = "规则名称长度必须在 1-200 之间"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "规则编码长度必须在 1-20 之间"))]
    pub code: String,
    #[validate(length(max = 2000, message = "描述不能超过 2000 字符"))]
    pub description: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// 原始规则定义，在服务端解析并校验
    pub rule_definition: Value,
}

fn default_true() -> bool {
    true
}

impl CreateRuleRequest {
    /// 解析为引擎载荷，定义解析失败映射为 InvalidDefinition
    pub fn into_spec(self) -> Result<RuleSpec> {
        self.validate().map_err(ApiError::from)?;
        let rule_definition: RuleLogic = serde_json::from_value(self.rule_definition)
            .map_err(|e| {
                ApiError::Engine(fraud_engine::EngineError::InvalidDefinition(format!(
                    "规则定义解析失败: {}",
                    e
                )))
            })?;
        Ok(RuleSpec {
            name: self.name,
            code: self.code,
            description: self.description,
            category: self.category,
            severity: self.severity,
            is_active: self.is_active,
            rule_definition,
        })
    }
}

/// 更新规则请求（expected_version 用于乐观并发控制）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    #[validate(length(min = 1, max = 200, message = "规则名称长度必须在 1-200 之间"))]
    pub name: String,
    #[validate(length(min = 1, max = 20, message = "规则编码长度必须在 1-20 之间"))]
    pub code: String,
    #[validate(length(max = 2000, message = "描述不能超过 2000 字符"))]
    pub description: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub rule_definition: Value,
    pub expected_version: Option<u32>,
}

impl UpdateRuleRequest {
    pub fn into_spec(self) -> Result<(RuleSpec, Option<u32>)> {
        let expected = self.expected_version;
        let create = CreateRuleRequest {
            name: self.name,
            code: self.code,
            description: self.description,
            category: self.category,
            severity: self.severity,
            is_active: self.is_active,
            rule_definition: self.rule_definition,
        };
        Ok((create.into_spec()?, expected))
    }
}

/// 执行运行请求：报销批次直接随请求体进入引擎
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRunRequest {
    pub job_id: Option<Uuid>,
    pub claims: Vec<Claim>,
}

/// 复核请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[validate(length(min = 1, max = 2000, message = "复核备注长度必须在 1-2000 之间"))]
    pub notes: String,
}

/// 分页参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    /// 对内存集合切页，page 从 1 开始
    pub fn slice<T: Clone>(&self, items: &[T]) -> (Vec<T>, usize) {
        let total = items.len();
        let page_size = self.page_size.clamp(1, 500);
        let start = (self.page.max(1) - 1) * page_size;
        let page = items
            .iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();
        (page, total)
    }
}

/// 规则列表查询参数
///
/// 分页字段内联而不是 flatten：serde_urlencoded 对 flatten 结构中的
/// 数值字段无法反序列化。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleListParams {
    pub category: Option<RuleCategory>,
    pub severity: Option<Severity>,
    pub is_active: Option<bool>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl RuleListParams {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// 标记列表查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagListParams {
    pub run_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub severity: Option<Severity>,
    pub category: Option<RuleCategory>,
    pub reviewed: Option<bool>,
    pub claim_number: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl FlagListParams {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_request(definition: Value) -> CreateRuleRequest {
        serde_json::from_value(json!({
            "name": "High quantity",
            "code": "DR-001",
            "category": "QTY_DAYS_SUPPLY",
            "severity": "FINANCIAL",
            "ruleDefinition": definition,
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_definition_parses() {
        let req = create_request(json!({
            "logic_type": "SIMPLE",
            "conditions": [{"field": "quantity", "operator": "gt", "value": 90}]
        }));
        let spec = req.into_spec().unwrap();
        assert_eq!(spec.code, "DR-001");
        assert!(spec.is_active);
    }

    #[test]
    fn test_unknown_logic_type_is_invalid_definition() {
        let req = create_request(json!({"logic_type": "MAGIC", "conditions": []}));
        let err = req.into_spec().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RULE_DEFINITION");
    }

    #[test]
    fn test_unknown_field_name_is_invalid_definition() {
        let req = create_request(json!({
            "logic_type": "SIMPLE",
            "conditions": [{"field": "not_a_field", "operator": "gt", "value": 1}]
        }));
        let err = req.into_spec().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_RULE_DEFINITION");
    }

    #[test]
    fn test_empty_name_fails_validation() {
        let req: CreateRuleRequest = serde_json::from_value(json!({
            "name": "",
            "code": "DR-001",
            "category": "OTHER",
            "severity": "COMPLIANCE",
            "ruleDefinition": {"logic_type": "DUPLICATE", "keys": ["tenant_id"]},
        }))
        .unwrap();
        let err = req.into_spec().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_pagination_slice() {
        let items: Vec<i32> = (0..45).collect();
        let params = PaginationParams { page: 3, page_size: 20 };
        let (page, total) = params.slice(&items);
        assert_eq!(total, 45);
        assert_eq!(page.len(), 5);
        assert_eq!(page[0], 40);
    }
}
