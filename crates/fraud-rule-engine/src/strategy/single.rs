//! 单条策略：SIMPLE、RATIO_RANGE、REGEX、FIELD_COMPARE、IN_LIST/NOT_IN_LIST
//!
//! 每条报销记录独立求值，无跨条状态。输出顺序固定为
//! （fill_date 升序，claim_number 升序），保证重复运行产生字节一致的标记集。

use serde_json::{Value, json};

use super::Deadline;
use crate::claim::{Claim, ClaimField, FieldValue};
use crate::compiler::{CompiledCondition, CompiledRule};
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::FlagCandidate;
use crate::operators::{Combinator, Operator};

/// 预算检查的步长：每处理这么多条记录探测一次墙钟
const DEADLINE_STRIDE: usize = 4096;

/// 按确定性顺序逐条求值，`check` 返回 Some(解释) 即产出标记候选
pub(super) fn per_claim<F>(
    _rule: &CompiledRule,
    claims: &[Claim],
    deadline: Deadline,
    check: F,
) -> Result<Vec<FlagCandidate>>
where
    F: Fn(&Claim) -> Option<Value>,
{
    let mut ordered: Vec<&Claim> = claims.iter().collect();
    ordered.sort_by(|a, b| a.sort_key(ClaimField::FillDate).cmp(&b.sort_key(ClaimField::FillDate)));

    let mut out = Vec::new();
    for (idx, claim) in ordered.into_iter().enumerate() {
        if idx % DEADLINE_STRIDE == 0 {
            deadline.check()?;
        }
        if let Some(explanation) = check(claim) {
            out.push(FlagCandidate {
                claim_number: claim.claim_number.clone(),
                explanation,
            });
        }
    }
    Ok(out)
}

/// SIMPLE/THRESHOLD：按声明的组合方式（all=AND / any=OR）合并原子条件
pub(super) fn simple(
    rule: &CompiledRule,
    logic: Combinator,
    conditions: &[CompiledCondition],
    claim: &Claim,
) -> Option<Value> {
    let mut results = Vec::with_capacity(conditions.len());
    let mut matched = Vec::new();

    for (idx, cond) in conditions.iter().enumerate() {
        let actual = claim.resolve(cond.field);
        let hit = ConditionEvaluator::evaluate(cond, actual.as_ref());
        results.push(hit);
        if hit {
            matched.push(json!({
                "condition_index": idx,
                "field": cond.field.to_string(),
                "operator": cond.operator.to_string(),
                "expected_value": cond.expected_display,
                "actual_value": actual.as_ref().map(value_json),
            }));
        }
    }

    let overall = match logic {
        Combinator::All => results.iter().all(|r| *r),
        Combinator::Any => results.iter().any(|r| *r),
    };
    if !overall {
        return None;
    }

    Some(json!({
        "message": format!(
            "报销记录 {} 命中规则 '{}': {}/{} 条件满足",
            claim.claim_number, rule.name, matched.len(), conditions.len()
        ),
        "logic": logic.to_string(),
        "total_conditions": conditions.len(),
        "matched_count": matched.len(),
        "matched_conditions": matched,
    }))
}

/// RATIO_RANGE：fieldA / fieldB 落在 [min, max] 之外即标记，除零视为不命中
pub(super) fn ratio_range(
    rule: &CompiledRule,
    numerator_field: ClaimField,
    denominator_field: ClaimField,
    min: f64,
    max: f64,
    claim: &Claim,
) -> Option<Value> {
    let numerator = claim.resolve(numerator_field)?.as_number()?;
    let denominator = claim.resolve(denominator_field)?.as_number()?;
    if denominator == 0.0 {
        return None;
    }

    let ratio = numerator / denominator;
    if (min..=max).contains(&ratio) {
        return None;
    }

    Some(json!({
        "message": format!(
            "报销记录 {} 命中规则 '{}': {}/{} = {:.4} 超出 [{}, {}]",
            claim.claim_number, rule.name, numerator_field, denominator_field, ratio, min, max
        ),
        "numerator_field": numerator_field.to_string(),
        "numerator": numerator,
        "denominator_field": denominator_field.to_string(),
        "denominator": denominator,
        "ratio": ratio,
        "min": min,
        "max": max,
    }))
}

pub(super) fn regex(
    rule: &CompiledRule,
    field: ClaimField,
    regex: &regex::Regex,
    claim: &Claim,
) -> Option<Value> {
    let actual = claim.resolve(field)?.to_text();
    if !regex.is_match(&actual) {
        return None;
    }

    Some(json!({
        "message": format!(
            "报销记录 {} 命中规则 '{}': {} 匹配模式 {}",
            claim.claim_number, rule.name, field, regex.as_str()
        ),
        "field": field.to_string(),
        "pattern": regex.as_str(),
        "actual_value": actual,
    }))
}

/// FIELD_COMPARE：同一条记录内两个字段的比较，类型不可比时失败闭合
pub(super) fn field_compare(
    rule: &CompiledRule,
    field_a: ClaimField,
    operator: Operator,
    field_b: ClaimField,
    claim: &Claim,
) -> Option<Value> {
    let a = claim.resolve(field_a)?;
    let b = claim.resolve(field_b)?;

    let hit = match (a.as_number(), b.as_number(), a.as_date(), b.as_date()) {
        (Some(x), Some(y), _, _) => ordering_holds(operator, x.partial_cmp(&y)?),
        (_, _, Some(x), Some(y)) => ordering_holds(operator, x.cmp(&y)),
        _ => match operator {
            Operator::Eq => a.to_text().to_lowercase() == b.to_text().to_lowercase(),
            Operator::Ne => a.to_text().to_lowercase() != b.to_text().to_lowercase(),
            _ => false,
        },
    };
    if !hit {
        return None;
    }

    Some(json!({
        "message": format!(
            "报销记录 {} 命中规则 '{}': {} ({}) {} {} ({})",
            claim.claim_number, rule.name, field_a, a, operator, field_b, b
        ),
        "field_a": field_a.to_string(),
        "value_a": value_json(&a),
        "operator": operator.to_string(),
        "field_b": field_b.to_string(),
        "value_b": value_json(&b),
    }))
}

/// IN_LIST / NOT_IN_LIST：成员检查大小写不敏感，缺失字段失败闭合
pub(super) fn list_membership(
    rule: &CompiledRule,
    field: ClaimField,
    values: &[String],
    expect_member: bool,
    claim: &Claim,
) -> Option<Value> {
    let actual = claim.resolve(field)?.to_text();
    let is_member = values.iter().any(|v| *v == actual.to_lowercase());
    if is_member != expect_member {
        return None;
    }

    let verdict = if expect_member { "在列表中" } else { "不在列表中" };
    Some(json!({
        "message": format!(
            "报销记录 {} 命中规则 '{}': {} = '{}' {}",
            claim.claim_number, rule.name, field, actual, verdict
        ),
        "field": field.to_string(),
        "actual_value": actual,
        "list_size": values.len(),
    }))
}

fn ordering_holds(operator: Operator, ordering: std::cmp::Ordering) -> bool {
    match operator {
        Operator::Gt => ordering.is_gt(),
        Operator::Lt => ordering.is_lt(),
        Operator::Gte => ordering.is_ge(),
        Operator::Lte => ordering.is_le(),
        Operator::Eq => ordering.is_eq(),
        Operator::Ne => ordering.is_ne(),
        _ => false,
    }
}

/// 数值保持 JSON 数值，其余按文本渲染
pub(super) fn value_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Number(n) => json!(n),
        other => json!(other.to_text()),
    }
}
