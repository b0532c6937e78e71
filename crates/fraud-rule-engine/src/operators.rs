//! 条件操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 原子条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 数值/日期比较
    Gt,
    Lt,
    Gte,
    Lte,

    // 通用比较
    Eq,
    Ne,

    // 字符串操作（统一大小写不敏感）
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,

    // 列表包含
    InList,
    NotInList,

    // 空值检查
    IsNull,
    IsNotNull,
}

impl Operator {
    /// 数值比较操作符在非数值上失败闭合（返回 false 而不是报错）
    pub fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }

    /// 字段对比（FIELD_COMPARE）只允许比较类操作符
    pub fn is_comparison(self) -> bool {
        self.is_ordering() || matches!(self, Self::Eq | Self::Ne)
    }

    /// 需要列表字面量的操作符
    pub fn takes_list(self) -> bool {
        matches!(self, Self::InList | Self::NotInList)
    }

    /// 不需要比较值的操作符
    pub fn takes_no_value(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::InList => "in_list",
            Self::NotInList => "not_in_list",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
        };
        write!(f, "{}", s)
    }
}

/// 条件组合方式（SIMPLE 规则的 all/any）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// 全部条件满足（AND）
    #[default]
    #[serde(alias = "AND")]
    All,
    /// 任一条件满足（OR）
    #[serde(alias = "OR")]
    Any,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
        }
    }
}
