//! 规则引擎错误类型

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    /// 规则引用了报销记录中不存在的字段，在规则加载时报错而不是求值时
    #[error("未知字段: {0}")]
    UnknownField(String),

    /// 规则定义不合法（缺少参数、正则无效等），在创建/更新时拒绝，不会进入版本历史
    #[error("规则定义无效: {0}")]
    InvalidDefinition(String),

    /// 单条记录求值时的意外故障，按记录隔离，不中断整个运行
    #[error("求值失败: {0}")]
    Evaluation(String),

    /// 批次级故障，整个运行转为 FAILED，已计算的部分标记被丢弃
    #[error("运行失败: {0}")]
    RunFailure(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(Uuid),

    #[error("标记未找到: {0}")]
    FlagNotFound(Uuid),

    #[error("运行未找到: {0}")]
    RunNotFound(Uuid),

    /// 复核是单向转换，二次复核被拒绝
    #[error("标记已复核: {0}")]
    AlreadyReviewed(Uuid),

    /// 同一规则的并发编辑冲突，由存储层串行化后重试
    #[error("规则 {rule_id} 版本冲突: 期望版本 {expected}")]
    VersionConflict { rule_id: Uuid, expected: u32 },

    /// 同一批次作业同时只允许一个活跃运行
    #[error("作业 {0} 已有运行在执行中")]
    RunConflict(Uuid),

    #[error("规则编码已存在: {0}")]
    DuplicateRuleCode(String),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_contains_context() {
        let id = Uuid::new_v4();
        assert!(
            EngineError::AlreadyReviewed(id)
                .to_string()
                .contains(&id.to_string())
        );
        assert!(
            EngineError::UnknownField("foo".to_string())
                .to_string()
                .contains("foo")
        );
        assert!(
            EngineError::DuplicateRuleCode("DR-001".to_string())
                .to_string()
                .contains("DR-001")
        );
    }
}
