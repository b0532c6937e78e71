//! 共享错误类型
//!
//! 基础设施层（配置、数据库）的错误定义，使用 thiserror 提供可读的错误信息。

use thiserror::Error;

/// 基础设施错误
#[derive(Debug, Error)]
pub enum SharedError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("缺少配置项: {0}")]
    MissingConfig(String),

    #[error("日志初始化失败: {0}")]
    Observability(String),
}

pub type Result<T> = std::result::Result<T, SharedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display() {
        let err = SharedError::from(sqlx::Error::RowNotFound);
        assert!(err.to_string().contains("数据库错误"));
    }

    #[test]
    fn test_observability_error_display() {
        let err = SharedError::Observability("already initialized".to_string());
        assert!(err.to_string().contains("already initialized"));
    }
}
