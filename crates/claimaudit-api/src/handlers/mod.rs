//! API 处理器模块

pub mod fraud;
pub mod health;
pub mod rule;
pub mod run;
