//! ClaimAudit 共享基础设施
//!
//! 为审计平台各服务提供统一的配置加载、错误类型、
//! 数据库连接池和日志初始化能力。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;

pub use config::AppConfig;
pub use database::Database;
pub use error::{Result, SharedError};
