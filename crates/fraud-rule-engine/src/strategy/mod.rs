//! 逻辑策略集
//!
//! 每种 logic_type 对应一个策略：输入编译后的规则和一个批次的报销记录，
//! 输出零个或多个标记候选。单条策略逐条独立求值，跨条策略在单次调用内
//! 维护分组状态，调用结束即丢弃，绝不跨运行或跨规则共享。

mod batch;
mod single;

use std::time::Instant;

use crate::claim::Claim;
use crate::compiler::{CompiledLogic, CompiledRule};
use crate::error::{EngineError, Result};
use crate::models::FlagCandidate;

/// 墙钟预算的协作式检查点
///
/// 跨条策略在分组边界和大组内部定期调用，单条策略每隔一批记录调用，
/// 超时在策略内部即中止，单条昂贵规则不会整体冲破运行预算。
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn check(&self) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => {
                Err(EngineError::RunFailure("运行超时，超出墙钟预算".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// 对一个批次应用规则，返回按（日期升序，报销编号升序）确定性排序的标记候选
pub fn apply(
    rule: &CompiledRule,
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    match &rule.logic {
        CompiledLogic::Simple { logic, conditions } => {
            single::per_claim(rule, claims, deadline, |claim| {
                single::simple(rule, *logic, conditions, claim)
            })
        }
        CompiledLogic::RatioRange {
            numerator_field,
            denominator_field,
            min,
            max,
        } => single::per_claim(rule, claims, deadline, |claim| {
            single::ratio_range(rule, *numerator_field, *denominator_field, *min, *max, claim)
        }),
        CompiledLogic::Regex { field, regex } => {
            single::per_claim(rule, claims, deadline, |claim| {
                single::regex(rule, *field, regex, claim)
            })
        }
        CompiledLogic::FieldCompare {
            field_a,
            operator,
            field_b,
        } => single::per_claim(rule, claims, deadline, |claim| {
            single::field_compare(rule, *field_a, *operator, *field_b, claim)
        }),
        CompiledLogic::InList { field, values } => {
            single::per_claim(rule, claims, deadline, |claim| {
                single::list_membership(rule, *field, values, true, claim)
            })
        }
        CompiledLogic::NotInList { field, values } => {
            single::per_claim(rule, claims, deadline, |claim| {
                single::list_membership(rule, *field, values, false, claim)
            })
        }
        CompiledLogic::Duplicate { keys } => batch::duplicate(rule, keys, claims, deadline),
        CompiledLogic::DuplicateWindow {
            keys,
            date_field,
            window_days,
        } => batch::duplicate_window(rule, keys, *date_field, *window_days, claims, deadline),
        CompiledLogic::Overlap {
            keys,
            date_field,
            days_supply_field,
        } => batch::overlap(rule, keys, *date_field, *days_supply_field, claims, deadline),
        CompiledLogic::CountWindow {
            keys,
            date_field,
            window_days,
            threshold,
        } => batch::count_window(
            rule,
            keys,
            *date_field,
            *window_days,
            *threshold,
            claims,
            deadline,
        ),
        CompiledLogic::EarlyRefill {
            keys,
            date_field,
            days_supply_field,
            grace_percent,
        } => batch::early_refill(
            rule,
            keys,
            *date_field,
            *days_supply_field,
            *grace_percent,
            claims,
            deadline,
        ),
    }
}
