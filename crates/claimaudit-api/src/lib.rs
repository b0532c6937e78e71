//! 药品报销审计 REST API 服务
//!
//! 暴露规则管理、运行执行和标记复核三组端点，
//! 业务语义由 fraud_engine 提供，本 crate 只做 HTTP 映射。

pub mod dto;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod routes;
pub mod state;
