//! 药房报销欺诈检测规则引擎
//!
//! 提供可复用的规则求值能力，支持：
//! - 按 logic_type 分发的声明式规则定义（JSON）
//! - 规则校验、预编译与不可变版本历史
//! - 单条与跨条（分组/窗口/区间）检测策略
//! - 运行编排、标记记录与复核状态转换

pub mod claim;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod orchestrator;
pub mod recorder;
pub mod runs;
pub mod store;
pub mod strategy;

pub use claim::{Claim, ClaimField, FieldValue};
pub use compiler::{CompiledLogic, CompiledRule, RuleCompiler};
pub use error::{EngineError, Result};
pub use evaluator::ConditionEvaluator;
pub use models::{
    Condition, Flag, FlagCandidate, ReviewState, Rule, RuleCategory, RuleLogic, RuleSpec,
    RuleVersion, Run, RunStatus, Severity,
};
pub use operators::{Combinator, Operator};
pub use orchestrator::RunOrchestrator;
pub use recorder::{FlagFilter, FlagRecorder, FlagStats};
pub use runs::{RuleApplication, RunRegistry};
pub use store::{BulkOutcome, RuleFilter, RuleVersionStore};
