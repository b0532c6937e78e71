//! 规则引擎领域模型
//!
//! 规则定义按 logic_type 建模为带标签的和类型，每个变体只携带
//! 自己需要的参数，缺参在反序列化阶段即被发现，避免字符串分发。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::claim::ClaimField;
use crate::operators::{Combinator, Operator};

/// 规则严重性：FINANCIAL 可追回，COMPLIANCE 不可追回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Financial,
    Compliance,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Financial => write!(f, "FINANCIAL"),
            Self::Compliance => write!(f, "COMPLIANCE"),
        }
    }
}

/// 规则分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    DuplicateBilling,
    Utilization,
    QtyDaysSupply,
    Pricing,
    EligibilityNetwork,
    DrugRestrictions,
    PrescriberIntegrity,
    DateIntegrity,
    Documentation,
    ExtendedValidation,
    Other,
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateBilling => "DUPLICATE_BILLING",
            Self::Utilization => "UTILIZATION",
            Self::QtyDaysSupply => "QTY_DAYS_SUPPLY",
            Self::Pricing => "PRICING",
            Self::EligibilityNetwork => "ELIGIBILITY_NETWORK",
            Self::DrugRestrictions => "DRUG_RESTRICTIONS",
            Self::PrescriberIntegrity => "PRESCRIBER_INTEGRITY",
            Self::DateIntegrity => "DATE_INTEGRITY",
            Self::Documentation => "DOCUMENTATION",
            Self::ExtendedValidation => "EXTENDED_VALIDATION",
            Self::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

/// 原子条件：字段、操作符、比较值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: ClaimField,
    pub operator: Operator,
    /// is_null/is_not_null 不需要比较值；in_list 取逗号分隔字面量
    #[serde(default)]
    pub value: Value,
}

/// 规则定义（按 logic_type 分发的和类型）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "logic_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleLogic {
    /// 逐条记录独立求值的条件组合（THRESHOLD 为历史别名）
    #[serde(alias = "THRESHOLD")]
    Simple {
        #[serde(default)]
        logic: Combinator,
        conditions: Vec<Condition>,
    },
    /// 按键元组分组，组内除最早一条外全部标记
    Duplicate { keys: Vec<ClaimField> },
    /// 同上，但只有日期窗口内的记录触发
    DuplicateWindow {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        window_days: i64,
    },
    /// 组内按日期排序，供药期间区间相交的记录对全部标记
    Overlap {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        days_supply_field: ClaimField,
    },
    /// 滑动日期窗口内计数超阈值的记录标记
    CountWindow {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        window_days: i64,
        threshold: usize,
    },
    /// 同患者同药连续配药，上次供药耗尽前（含宽限比例）再次配药则标记
    EarlyRefill {
        #[serde(default = "default_refill_keys")]
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        days_supply_field: ClaimField,
        #[serde(default)]
        grace_percent: f64,
    },
    /// fieldA / fieldB 落在 [min, max] 之外则标记（除零视为不匹配）
    RatioRange {
        numerator_field: ClaimField,
        denominator_field: ClaimField,
        min: f64,
        max: f64,
    },
    /// 单字段正则匹配
    Regex { field: ClaimField, pattern: String },
    /// 双字段比较
    FieldCompare {
        field_a: ClaimField,
        operator: Operator,
        field_b: ClaimField,
    },
    /// 字段值在列表内则标记（values 为逗号分隔字面量，加载时解析一次）
    InList { field: ClaimField, values: String },
    /// 字段值不在列表内则标记
    NotInList { field: ClaimField, values: String },
}

/// EARLY_REFILL 省略 keys 时按租户+患者+药品编码分组
fn default_refill_keys() -> Vec<ClaimField> {
    vec![ClaimField::TenantId, ClaimField::PatientId, ClaimField::Ndc]
}

impl RuleLogic {
    /// 逻辑类型名（用于日志与运行统计）
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Simple { .. } => "SIMPLE",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::DuplicateWindow { .. } => "DUPLICATE_WINDOW",
            Self::Overlap { .. } => "OVERLAP",
            Self::CountWindow { .. } => "COUNT_WINDOW",
            Self::EarlyRefill { .. } => "EARLY_REFILL",
            Self::RatioRange { .. } => "RATIO_RANGE",
            Self::Regex { .. } => "REGEX",
            Self::FieldCompare { .. } => "FIELD_COMPARE",
            Self::InList { .. } => "IN_LIST",
            Self::NotInList { .. } => "NOT_IN_LIST",
        }
    }

    /// 是否需要整批记录才能求值（跨记录策略）
    pub fn is_cross_claim(&self) -> bool {
        matches!(
            self,
            Self::Duplicate { .. }
                | Self::DuplicateWindow { .. }
                | Self::Overlap { .. }
                | Self::CountWindow { .. }
                | Self::EarlyRefill { .. }
        )
    }
}

/// 规则创建/更新载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    /// 规则编码，格式 DR-###，活跃规则间唯一
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub rule_definition: RuleLogic,
}

fn default_true() -> bool {
    true
}

/// 规则（跨版本的稳定身份 + 当前定义）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: RuleCategory,
    pub severity: Severity,
    pub is_active: bool,
    /// 当前版本号，严格递增，同一时刻恰有一个版本是当前版本
    pub version: u32,
    pub rule_definition: RuleLogic,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 规则的不可变历史快照
///
/// 定义、分类、严重性或启用状态变化时创建；创建后永不修改或删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVersion {
    pub rule_id: Uuid,
    pub version: u32,
    pub rule_definition: RuleLogic,
    pub category: RuleCategory,
    pub severity: Severity,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 运行状态机：PENDING → PROCESSING → COMPLETED | FAILED，终态不再迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 一次规则引擎在报销批次上的执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
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

/// 复核状态：单向转换，结构上排除「已复核但无时间戳」的非法状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Reviewed {
        notes: String,
        at: DateTime<Utc>,
    },
}

impl ReviewState {
    pub fn is_reviewed(&self) -> bool {
        matches!(self, Self::Reviewed { .. })
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Self::Reviewed { notes, .. } => Some(notes),
            Self::Pending => None,
        }
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Reviewed { at, .. } => Some(*at),
            Self::Pending => None,
        }
    }
}

/// 策略产出的标记候选（尚未分配运行与版本信息）
#[derive(Debug, Clone)]
pub struct FlagCandidate {
    pub claim_number: String,
    /// 结构化解释：哪些条件命中、实际值是什么
    pub explanation: Value,
}

/// 规则违规标记
///
/// rule_version 钉在求值时刻的版本而不是当前版本，这是可追溯性的核心保证。
/// 创建后除复核字段外全部不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
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
    pub review: ReviewState,
}
