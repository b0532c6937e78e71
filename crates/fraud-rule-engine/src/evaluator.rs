//! 条件求值器
//!
//! 对单条报销记录求值编译后的原子条件。纯函数，失败闭合：
//! 缺失字段、类型不匹配一律返回 false（空值检查除外），绝不让单条
//! 脏数据中断整个运行。字符串比较统一大小写不敏感。

use crate::claim::FieldValue;
use crate::compiler::{CompiledCondition, CompiledValue};
use crate::operators::Operator;

pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 求值单个条件，`actual` 为字段解析结果（缺失即 None）
    pub fn evaluate(condition: &CompiledCondition, actual: Option<&FieldValue>) -> bool {
        // 空值检查是唯一对缺失字段有意义的操作符
        match condition.operator {
            Operator::IsNull => return actual.is_none(),
            Operator::IsNotNull => return actual.is_some(),
            _ => {}
        }

        let Some(actual) = actual else {
            return false;
        };

        match condition.operator {
            Operator::Gt => Self::compare(actual, &condition.value, |o| o.is_gt()),
            Operator::Lt => Self::compare(actual, &condition.value, |o| o.is_lt()),
            Operator::Gte => Self::compare(actual, &condition.value, |o| o.is_ge()),
            Operator::Lte => Self::compare(actual, &condition.value, |o| o.is_le()),
            Operator::Eq => Self::equals(actual, &condition.value),
            Operator::Ne => {
                // ne 同样失败闭合：类型不可比时返回 false 而不是 true
                Self::comparable(actual, &condition.value) && !Self::equals(actual, &condition.value)
            }
            Operator::Contains => Self::with_text(actual, &condition.value, |a, e| a.contains(e)),
            Operator::NotContains => {
                Self::with_text(actual, &condition.value, |a, e| !a.contains(e))
            }
            Operator::StartsWith => {
                Self::with_text(actual, &condition.value, |a, e| a.starts_with(e))
            }
            Operator::EndsWith => Self::with_text(actual, &condition.value, |a, e| a.ends_with(e)),
            Operator::Regex => match &condition.value {
                CompiledValue::Regex(re) => re.is_match(&actual.to_text()),
                _ => false,
            },
            Operator::InList => Self::in_list(actual, &condition.value),
            Operator::NotInList => match &condition.value {
                CompiledValue::List(_) => !Self::in_list(actual, &condition.value),
                _ => false,
            },
            Operator::IsNull | Operator::IsNotNull => unreachable!("已在上方处理"),
        }
    }

    /// 排序比较：数值对数值，日期对日期，其余失败闭合
    fn compare(
        actual: &FieldValue,
        expected: &CompiledValue,
        check: fn(std::cmp::Ordering) -> bool,
    ) -> bool {
        match expected {
            CompiledValue::Number(e) => actual
                .as_number()
                .and_then(|a| a.partial_cmp(e))
                .is_some_and(check),
            CompiledValue::Date(e) => actual.as_date().map(|a| a.cmp(e)).is_some_and(check),
            _ => false,
        }
    }

    fn comparable(actual: &FieldValue, expected: &CompiledValue) -> bool {
        match expected {
            CompiledValue::Number(_) => actual.as_number().is_some(),
            CompiledValue::Date(_) => actual.as_date().is_some(),
            CompiledValue::Text(_) => true,
            _ => false,
        }
    }

    fn equals(actual: &FieldValue, expected: &CompiledValue) -> bool {
        match expected {
            CompiledValue::Number(e) => actual.as_number().is_some_and(|a| a == *e),
            CompiledValue::Date(e) => actual.as_date().is_some_and(|a| a == *e),
            CompiledValue::Text(e) => actual.to_text().to_lowercase() == *e,
            _ => false,
        }
    }

    /// 编译值中的文本已小写，这里只需小写实际值
    fn with_text(
        actual: &FieldValue,
        expected: &CompiledValue,
        check: fn(&str, &str) -> bool,
    ) -> bool {
        match expected {
            CompiledValue::Text(e) => check(&actual.to_text().to_lowercase(), e),
            _ => false,
        }
    }

    fn in_list(actual: &FieldValue, expected: &CompiledValue) -> bool {
        match expected {
            CompiledValue::List(items) => {
                let a = actual.to_text().to_lowercase();
                items.iter().any(|item| *item == a)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimField;
    use chrono::NaiveDate;

    fn cond(field: ClaimField, operator: Operator, value: CompiledValue) -> CompiledCondition {
        CompiledCondition {
            field,
            operator,
            value,
            expected_display: String::new(),
        }
    }

    #[test]
    fn test_numeric_ordering() {
        let c = cond(ClaimField::Quantity, Operator::Gt, CompiledValue::Number(90.0));
        assert!(ConditionEvaluator::evaluate(&c, Some(&FieldValue::Number(120.0))));
        assert!(!ConditionEvaluator::evaluate(&c, Some(&FieldValue::Number(90.0))));
        let c = cond(ClaimField::Quantity, Operator::Gte, CompiledValue::Number(90.0));
        assert!(ConditionEvaluator::evaluate(&c, Some(&FieldValue::Number(90.0))));
    }

    #[test]
    fn test_numeric_comparison_fails_closed_on_text() {
        // 数值比较遇到无法解析的文本返回 false，而不是报错
        let c = cond(ClaimField::Quantity, Operator::Gt, CompiledValue::Number(90.0));
        assert!(!ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("N/A".to_string()))
        ));
    }

    #[test]
    fn test_missing_field_is_false_except_null_checks() {
        let c = cond(ClaimField::Quantity, Operator::Gt, CompiledValue::Number(1.0));
        assert!(!ConditionEvaluator::evaluate(&c, None));

        let c = cond(ClaimField::ReversalDate, Operator::IsNull, CompiledValue::None);
        assert!(ConditionEvaluator::evaluate(&c, None));

        let c = cond(ClaimField::ReversalDate, Operator::IsNotNull, CompiledValue::None);
        assert!(!ConditionEvaluator::evaluate(&c, None));
    }

    #[test]
    fn test_string_operators_case_insensitive() {
        let c = cond(
            ClaimField::DrugName,
            Operator::Contains,
            CompiledValue::Text("oxy".to_string()),
        );
        assert!(ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("OxyContin 20mg".to_string()))
        ));

        let c = cond(
            ClaimField::DrugName,
            Operator::Eq,
            CompiledValue::Text("oxycontin".to_string()),
        );
        assert!(ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("OXYCONTIN".to_string()))
        ));
    }

    #[test]
    fn test_starts_with_and_ends_with() {
        let actual = FieldValue::Text("00093-0058-01".to_string());
        let c = cond(
            ClaimField::Ndc,
            Operator::StartsWith,
            CompiledValue::Text("00093".to_string()),
        );
        assert!(ConditionEvaluator::evaluate(&c, Some(&actual)));
        let c = cond(
            ClaimField::Ndc,
            Operator::EndsWith,
            CompiledValue::Text("99".to_string()),
        );
        assert!(!ConditionEvaluator::evaluate(&c, Some(&actual)));
    }

    #[test]
    fn test_date_comparison() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let c = cond(
            ClaimField::FillDate,
            Operator::Lt,
            CompiledValue::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        );
        assert!(ConditionEvaluator::evaluate(&c, Some(&FieldValue::Date(day))));
    }

    #[test]
    fn test_in_list_membership() {
        let c = cond(
            ClaimField::DrugName,
            Operator::InList,
            CompiledValue::List(vec!["oxycontin".to_string(), "fentanyl".to_string()]),
        );
        assert!(ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("Fentanyl".to_string()))
        ));
        assert!(!ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("Lisinopril".to_string()))
        ));

        let c = cond(
            ClaimField::DrugName,
            Operator::NotInList,
            CompiledValue::List(vec!["oxycontin".to_string()]),
        );
        assert!(ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("Lisinopril".to_string()))
        ));
    }

    #[test]
    fn test_regex_match() {
        let c = cond(
            ClaimField::Ndc,
            Operator::Regex,
            CompiledValue::Regex(regex::Regex::new(r"^\d{5}-\d{4}-\d{2}$").unwrap()),
        );
        assert!(ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("00093-0058-01".to_string()))
        ));
        assert!(!ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("bad-ndc".to_string()))
        ));
    }

    #[test]
    fn test_ne_fails_closed_on_incomparable() {
        // quantity ne 5 在字段为不可解析文本时返回 false
        let c = cond(ClaimField::Quantity, Operator::Ne, CompiledValue::Number(5.0));
        assert!(!ConditionEvaluator::evaluate(
            &c,
            Some(&FieldValue::Text("garbage".to_string()))
        ));
        assert!(ConditionEvaluator::evaluate(&c, Some(&FieldValue::Number(7.0))));
        assert!(!ConditionEvaluator::evaluate(&c, Some(&FieldValue::Number(5.0))));
    }
}
