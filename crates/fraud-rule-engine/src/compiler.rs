//! 规则编译器
//!
//! 把声明式规则定义校验并编译为可执行形式：正则在加载时编译一次，
//! 列表字面量在加载时解析一次，值按目标字段类型预先强制转换。
//! 所有定义错误在创建/更新时拒绝（InvalidDefinition），不会进入版本历史，
//! 更不会拖到运行阶段。

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::claim::ClaimField;
use crate::error::{EngineError, Result};
use crate::models::{Condition, RuleCategory, RuleLogic, RuleVersion, Severity};
use crate::operators::{Combinator, Operator};

/// 编译后的比较值（已按字段类型强制转换）
#[derive(Debug, Clone)]
pub enum CompiledValue {
    /// is_null / is_not_null 不需要比较值
    None,
    Number(f64),
    Date(NaiveDate),
    /// 字符串比较统一小写（大小写不敏感）
    Text(String),
    /// 列表成员统一小写，加载时解析一次而不是逐条记录解析
    List(Vec<String>),
    Regex(Regex),
}

/// 编译后的原子条件
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub field: ClaimField,
    pub operator: Operator,
    pub value: CompiledValue,
    /// 原始比较值的展示形式，用于标记解释
    pub expected_display: String,
}

/// 编译后的规则逻辑，镜像 RuleLogic 但携带预编译产物
#[derive(Debug, Clone)]
pub enum CompiledLogic {
    Simple {
        logic: Combinator,
        conditions: Vec<CompiledCondition>,
    },
    Duplicate {
        keys: Vec<ClaimField>,
    },
    DuplicateWindow {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        window_days: i64,
    },
    Overlap {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        days_supply_field: ClaimField,
    },
    CountWindow {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        window_days: i64,
        threshold: usize,
    },
    EarlyRefill {
        keys: Vec<ClaimField>,
        date_field: ClaimField,
        days_supply_field: ClaimField,
        grace_percent: f64,
    },
    RatioRange {
        numerator_field: ClaimField,
        denominator_field: ClaimField,
        min: f64,
        max: f64,
    },
    Regex {
        field: ClaimField,
        regex: Regex,
    },
    FieldCompare {
        field_a: ClaimField,
        operator: Operator,
        field_b: ClaimField,
    },
    InList {
        field: ClaimField,
        values: Vec<String>,
    },
    NotInList {
        field: ClaimField,
        values: Vec<String>,
    },
}

/// 编译后的规则，携带钉死的版本出处
///
/// 运行开始时对活跃规则做快照得到的就是这组结构，
/// 标记上的 rule_version 即来自这里，而不是求值后的当前版本。
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule_id: uuid::Uuid,
    pub code: String,
    pub name: String,
    pub version: u32,
    pub severity: Severity,
    pub category: RuleCategory,
    pub logic: CompiledLogic,
}

impl CompiledRule {
    pub fn logic_type(&self) -> &'static str {
        match &self.logic {
            CompiledLogic::Simple { .. } => "SIMPLE",
            CompiledLogic::Duplicate { .. } => "DUPLICATE",
            CompiledLogic::DuplicateWindow { .. } => "DUPLICATE_WINDOW",
            CompiledLogic::Overlap { .. } => "OVERLAP",
            CompiledLogic::CountWindow { .. } => "COUNT_WINDOW",
            CompiledLogic::EarlyRefill { .. } => "EARLY_REFILL",
            CompiledLogic::RatioRange { .. } => "RATIO_RANGE",
            CompiledLogic::Regex { .. } => "REGEX",
            CompiledLogic::FieldCompare { .. } => "FIELD_COMPARE",
            CompiledLogic::InList { .. } => "IN_LIST",
            CompiledLogic::NotInList { .. } => "NOT_IN_LIST",
        }
    }

    pub fn is_cross_claim(&self) -> bool {
        matches!(
            self.logic,
            CompiledLogic::Duplicate { .. }
                | CompiledLogic::DuplicateWindow { .. }
                | CompiledLogic::Overlap { .. }
                | CompiledLogic::CountWindow { .. }
                | CompiledLogic::EarlyRefill { .. }
        )
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 仅校验定义合法性（创建/更新入口使用）
    pub fn validate(definition: &RuleLogic) -> Result<()> {
        Self::compile_logic(definition).map(|_| ())
    }

    /// 从版本快照编译出可执行规则
    pub fn compile(rule_id: uuid::Uuid, code: &str, name: &str, snapshot: &RuleVersion) -> Result<CompiledRule> {
        let logic = Self::compile_logic(&snapshot.rule_definition)?;
        Ok(CompiledRule {
            rule_id,
            code: code.to_string(),
            name: name.to_string(),
            version: snapshot.version,
            severity: snapshot.severity,
            category: snapshot.category,
            logic,
        })
    }

    fn compile_logic(definition: &RuleLogic) -> Result<CompiledLogic> {
        match definition {
            RuleLogic::Simple { logic, conditions } => {
                if conditions.is_empty() {
                    return Err(EngineError::InvalidDefinition(
                        "SIMPLE 规则至少需要一个条件".to_string(),
                    ));
                }
                let compiled = conditions
                    .iter()
                    .map(Self::compile_condition)
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledLogic::Simple {
                    logic: *logic,
                    conditions: compiled,
                })
            }
            RuleLogic::Duplicate { keys } => {
                Self::require_keys(keys, "DUPLICATE")?;
                Ok(CompiledLogic::Duplicate { keys: keys.clone() })
            }
            RuleLogic::DuplicateWindow {
                keys,
                date_field,
                window_days,
            } => {
                Self::require_keys(keys, "DUPLICATE_WINDOW")?;
                Self::require_date_field(*date_field)?;
                Self::require_positive_window(*window_days)?;
                Ok(CompiledLogic::DuplicateWindow {
                    keys: keys.clone(),
                    date_field: *date_field,
                    window_days: *window_days,
                })
            }
            RuleLogic::Overlap {
                keys,
                date_field,
                days_supply_field,
            } => {
                Self::require_keys(keys, "OVERLAP")?;
                Self::require_date_field(*date_field)?;
                Self::require_numeric_field(*days_supply_field)?;
                Ok(CompiledLogic::Overlap {
                    keys: keys.clone(),
                    date_field: *date_field,
                    days_supply_field: *days_supply_field,
                })
            }
            RuleLogic::CountWindow {
                keys,
                date_field,
                window_days,
                threshold,
            } => {
                Self::require_keys(keys, "COUNT_WINDOW")?;
                Self::require_date_field(*date_field)?;
                Self::require_positive_window(*window_days)?;
                if *threshold == 0 {
                    return Err(EngineError::InvalidDefinition(
                        "COUNT_WINDOW 的 threshold 必须至少为 1".to_string(),
                    ));
                }
                Ok(CompiledLogic::CountWindow {
                    keys: keys.clone(),
                    date_field: *date_field,
                    window_days: *window_days,
                    threshold: *threshold,
                })
            }
            RuleLogic::EarlyRefill {
                keys,
                date_field,
                days_supply_field,
                grace_percent,
            } => {
                Self::require_keys(keys, "EARLY_REFILL")?;
                Self::require_date_field(*date_field)?;
                Self::require_numeric_field(*days_supply_field)?;
                if !(0.0..=100.0).contains(grace_percent) {
                    return Err(EngineError::InvalidDefinition(format!(
                        "EARLY_REFILL 的 grace_percent 必须在 [0, 100] 内，当前 {}",
                        grace_percent
                    )));
                }
                Ok(CompiledLogic::EarlyRefill {
                    keys: keys.clone(),
                    date_field: *date_field,
                    days_supply_field: *days_supply_field,
                    grace_percent: *grace_percent,
                })
            }
            RuleLogic::RatioRange {
                numerator_field,
                denominator_field,
                min,
                max,
            } => {
                Self::require_numeric_field(*numerator_field)?;
                Self::require_numeric_field(*denominator_field)?;
                if min > max {
                    return Err(EngineError::InvalidDefinition(format!(
                        "RATIO_RANGE 区间无效: min {} 大于 max {}",
                        min, max
                    )));
                }
                Ok(CompiledLogic::RatioRange {
                    numerator_field: *numerator_field,
                    denominator_field: *denominator_field,
                    min: *min,
                    max: *max,
                })
            }
            RuleLogic::Regex { field, pattern } => {
                let regex = Regex::new(pattern).map_err(|e| {
                    EngineError::InvalidDefinition(format!("正则表达式无效 '{}': {}", pattern, e))
                })?;
                Ok(CompiledLogic::Regex {
                    field: *field,
                    regex,
                })
            }
            RuleLogic::FieldCompare {
                field_a,
                operator,
                field_b,
            } => {
                if !operator.is_comparison() {
                    return Err(EngineError::InvalidDefinition(format!(
                        "FIELD_COMPARE 不支持操作符 {}",
                        operator
                    )));
                }
                Ok(CompiledLogic::FieldCompare {
                    field_a: *field_a,
                    operator: *operator,
                    field_b: *field_b,
                })
            }
            RuleLogic::InList { field, values } => Ok(CompiledLogic::InList {
                field: *field,
                values: Self::parse_list_literal(values)?,
            }),
            RuleLogic::NotInList { field, values } => Ok(CompiledLogic::NotInList {
                field: *field,
                values: Self::parse_list_literal(values)?,
            }),
        }
    }

    /// 编译原子条件：比较值按目标字段类型预先强制转换
    fn compile_condition(cond: &Condition) -> Result<CompiledCondition> {
        let expected_display = match &cond.value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let value = if cond.operator.takes_no_value() {
            CompiledValue::None
        } else if cond.operator == Operator::Regex {
            let pattern = cond.value.as_str().ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "字段 {} 的 regex 操作符需要字符串模式",
                    cond.field
                ))
            })?;
            let regex = Regex::new(pattern).map_err(|e| {
                EngineError::InvalidDefinition(format!("正则表达式无效 '{}': {}", pattern, e))
            })?;
            CompiledValue::Regex(regex)
        } else if cond.operator.takes_list() {
            CompiledValue::List(Self::parse_list_value(&cond.value, cond.field)?)
        } else if cond.operator.is_ordering() {
            Self::compile_ordering_value(cond)?
        } else {
            // eq/ne/contains/starts_with/ends_with：按字段类型转换，默认小写文本
            Self::compile_typed_value(cond)?
        };

        Ok(CompiledCondition {
            field: cond.field,
            operator: cond.operator,
            value,
            expected_display,
        })
    }

    /// 排序比较只允许数值或日期字段，比较值必须能转换到对应类型
    fn compile_ordering_value(cond: &Condition) -> Result<CompiledValue> {
        if cond.field.is_numeric() {
            Self::as_number(&cond.value).map(CompiledValue::Number).ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "字段 {} 的 {} 操作符需要数值比较值",
                    cond.field, cond.operator
                ))
            })
        } else if cond.field.is_date() {
            Self::as_date(&cond.value).map(CompiledValue::Date).ok_or_else(|| {
                EngineError::InvalidDefinition(format!(
                    "字段 {} 的 {} 操作符需要 YYYY-MM-DD 日期比较值",
                    cond.field, cond.operator
                ))
            })
        } else {
            Err(EngineError::InvalidDefinition(format!(
                "文本字段 {} 不支持 {} 操作符",
                cond.field, cond.operator
            )))
        }
    }

    fn compile_typed_value(cond: &Condition) -> Result<CompiledValue> {
        if cond.field.is_numeric()
            && matches!(cond.operator, Operator::Eq | Operator::Ne)
            && let Some(n) = Self::as_number(&cond.value)
        {
            return Ok(CompiledValue::Number(n));
        }
        if cond.field.is_date()
            && matches!(cond.operator, Operator::Eq | Operator::Ne)
            && let Some(d) = Self::as_date(&cond.value)
        {
            return Ok(CompiledValue::Date(d));
        }
        match &cond.value {
            Value::String(s) => Ok(CompiledValue::Text(s.to_lowercase())),
            Value::Number(n) => Ok(CompiledValue::Text(n.to_string())),
            other => Err(EngineError::InvalidDefinition(format!(
                "字段 {} 的 {} 操作符不支持比较值 {}",
                cond.field, cond.operator, other
            ))),
        }
    }

    /// in_list 的比较值：JSON 数组或逗号分隔字面量，成员统一小写
    fn parse_list_value(value: &Value, field: ClaimField) -> Result<Vec<String>> {
        let items: Vec<String> = match value {
            Value::Array(arr) => arr
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.trim().to_lowercase(),
                    other => other.to_string().to_lowercase(),
                })
                .collect(),
            Value::String(s) => Self::split_literal(s),
            _ => {
                return Err(EngineError::InvalidDefinition(format!(
                    "字段 {} 的列表操作符需要数组或逗号分隔字面量",
                    field
                )));
            }
        };

        if items.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "字段 {} 的列表不能为空",
                field
            )));
        }
        Ok(items)
    }

    fn parse_list_literal(values: &str) -> Result<Vec<String>> {
        let items = Self::split_literal(values);
        if items.is_empty() {
            return Err(EngineError::InvalidDefinition(
                "列表字面量不能为空".to_string(),
            ));
        }
        Ok(items)
    }

    fn split_literal(s: &str) -> Vec<String> {
        s.split(',')
            .map(|item| item.trim().to_lowercase())
            .filter(|item| !item.is_empty())
            .collect()
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_date(value: &Value) -> Option<NaiveDate> {
        value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }

    fn require_keys(keys: &[ClaimField], logic_type: &str) -> Result<()> {
        if keys.is_empty() {
            return Err(EngineError::InvalidDefinition(format!(
                "{} 规则的 keys 不能为空",
                logic_type
            )));
        }
        Ok(())
    }

    fn require_date_field(field: ClaimField) -> Result<()> {
        if !field.is_date() {
            return Err(EngineError::InvalidDefinition(format!(
                "date_field 必须是日期字段，{} 不是",
                field
            )));
        }
        Ok(())
    }

    fn require_numeric_field(field: ClaimField) -> Result<()> {
        if !field.is_numeric() {
            return Err(EngineError::InvalidDefinition(format!(
                "需要数值字段，{} 不是",
                field
            )));
        }
        Ok(())
    }

    fn require_positive_window(window_days: i64) -> Result<()> {
        if window_days <= 0 {
            return Err(EngineError::InvalidDefinition(format!(
                "window_days 必须为正数，当前 {}",
                window_days
            )));
        }
        Ok(())
    }
}
