//! API 错误类型定义
//!
//! 引擎错误到 HTTP 语义的映射：定义/字段错误 400，资源缺失 404，
//! 状态冲突（重复编码、二次复核、同作业并发运行、版本冲突）409。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fraud_engine::EngineError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 请求错误
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("批次过大: {size} 条记录，上限 {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    // 引擎错误（状态码按变体细分）
    #[error(transparent)]
    Engine(#[from] EngineError),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BatchTooLarge { .. } => StatusCode::BAD_REQUEST,

            Self::Engine(e) => match e {
                EngineError::UnknownField(_)
                | EngineError::InvalidDefinition(_)
                | EngineError::Json(_) => StatusCode::BAD_REQUEST,
                EngineError::RuleNotFound(_)
                | EngineError::FlagNotFound(_)
                | EngineError::RunNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::AlreadyReviewed(_)
                | EngineError::VersionConflict { .. }
                | EngineError::RunConflict(_)
                | EngineError::DuplicateRuleCode(_) => StatusCode::CONFLICT,
                EngineError::Evaluation(_) | EngineError::RunFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },

            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（API 响应的 code 字段，客户端据此做条件分支）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            Self::Engine(e) => match e {
                EngineError::UnknownField(_) => "UNKNOWN_FIELD",
                EngineError::InvalidDefinition(_) => "INVALID_RULE_DEFINITION",
                EngineError::Json(_) => "INVALID_JSON",
                EngineError::RuleNotFound(_) => "RULE_NOT_FOUND",
                EngineError::FlagNotFound(_) => "FLAG_NOT_FOUND",
                EngineError::RunNotFound(_) => "RUN_NOT_FOUND",
                EngineError::AlreadyReviewed(_) => "ALREADY_REVIEWED",
                EngineError::VersionConflict { .. } => "VERSION_CONFLICT",
                EngineError::RunConflict(_) => "RUN_CONFLICT",
                EngineError::DuplicateRuleCode(_) => "DUPLICATE_RULE_CODE",
                EngineError::Evaluation(_) => "EVALUATION_ERROR",
                EngineError::RunFailure(_) => "RUN_FAILURE",
            },
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// 构造代表性错误变体及其期望的 (StatusCode, error_code) 映射。
    /// 表驱动方式保证新增变体时只需在一处维护。
    fn representative_variants() -> Vec<(ApiError, StatusCode, &'static str)> {
        let id = Uuid::new_v4();
        vec![
            (
                ApiError::Validation("name is required".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                ApiError::BatchTooLarge { size: 60_000, limit: 50_000 },
                StatusCode::BAD_REQUEST,
                "BATCH_TOO_LARGE",
            ),
            (
                ApiError::Engine(EngineError::UnknownField("foo".into())),
                StatusCode::BAD_REQUEST,
                "UNKNOWN_FIELD",
            ),
            (
                ApiError::Engine(EngineError::InvalidDefinition("missing keys".into())),
                StatusCode::BAD_REQUEST,
                "INVALID_RULE_DEFINITION",
            ),
            (
                ApiError::Engine(EngineError::RuleNotFound(id)),
                StatusCode::NOT_FOUND,
                "RULE_NOT_FOUND",
            ),
            (
                ApiError::Engine(EngineError::FlagNotFound(id)),
                StatusCode::NOT_FOUND,
                "FLAG_NOT_FOUND",
            ),
            (
                ApiError::Engine(EngineError::RunNotFound(id)),
                StatusCode::NOT_FOUND,
                "RUN_NOT_FOUND",
            ),
            (
                ApiError::Engine(EngineError::AlreadyReviewed(id)),
                StatusCode::CONFLICT,
                "ALREADY_REVIEWED",
            ),
            (
                ApiError::Engine(EngineError::VersionConflict { rule_id: id, expected: 3 }),
                StatusCode::CONFLICT,
                "VERSION_CONFLICT",
            ),
            (
                ApiError::Engine(EngineError::RunConflict(id)),
                StatusCode::CONFLICT,
                "RUN_CONFLICT",
            ),
            (
                ApiError::Engine(EngineError::DuplicateRuleCode("DR-001".into())),
                StatusCode::CONFLICT,
                "DUPLICATE_RULE_CODE",
            ),
            (
                ApiError::Engine(EngineError::RunFailure("timeout".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "RUN_FAILURE",
            ),
            (
                ApiError::Internal("unexpected state".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ]
    }

    /// 状态码错误会导致客户端误判请求结果，逐一锁定
    #[test]
    fn test_variant_status_codes() {
        for (error, expected_status, label) in representative_variants() {
            assert_eq!(error.status_code(), expected_status, "状态码不匹配: {label}");
        }
    }

    /// 错误码是 API 契约的一部分，任何变更都是破坏性变更
    #[test]
    fn test_variant_error_codes() {
        for (error, _status, expected_code) in representative_variants() {
            assert_eq!(error.error_code(), expected_code, "错误码不匹配: {expected_code}");
        }
    }

    /// IntoResponse 是错误到 HTTP 响应的最终出口，
    /// 验证状态码与 {success, code, message, data} 四字段结构。
    #[tokio::test]
    async fn test_into_response_body_structure() {
        for (error, expected_status, expected_code) in representative_variants() {
            let label = format!("{:?}", error);
            let response = error.into_response();
            assert_eq!(response.status(), expected_status, "响应状态码不匹配: {label}");

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

            assert_eq!(body["success"], json!(false), "success 应为 false: {label}");
            assert_eq!(body["code"], json!(expected_code), "code 不匹配: {label}");
            assert!(!body["message"].as_str().unwrap_or("").is_empty(), "message 不应为空: {label}");
            assert!(body["data"].is_null(), "data 应为 null: {label}");
        }
    }

    /// 系统级错误的响应消息不应泄露内部细节
    #[tokio::test]
    async fn test_system_errors_hide_internal_details() {
        let error = ApiError::Internal("stack overflow at module X".into());
        let response = error.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let message = body["message"].as_str().unwrap();

        assert!(!message.contains("stack overflow"), "消息泄露了内部细节: {message}");
        assert!(message.contains("服务内部错误"), "应返回通用提示: {message}");
    }

    #[test]
    fn test_from_validation_errors() {
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        let mut field_error = ValidationError::new("length");
        field_error.message = Some("规则名称不能为空".into());
        errors.add("name", field_error);

        let api_error: ApiError = errors.into();
        assert!(matches!(api_error, ApiError::Validation(_)));
        assert_eq!(api_error.status_code(), StatusCode::BAD_REQUEST);
    }
}
