//! 报销记录模型与字段解析器
//!
//! 定义药房报销记录的封闭字段集合，并提供带类型强制转换的字段解析。
//! 日期字段宽松解析：格式非法得到 None 而不是报错，
//! 让下游条件可以用 is_null 捕获脏数据。

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// 报销记录字段（封闭集合）
///
/// 规则定义只允许引用这里枚举的字段，未知字段名在规则加载时
/// 以 UnknownField 拒绝，不会拖到求值阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimField {
    TenantId,
    ClaimNumber,
    PatientId,
    RxNumber,
    Ndc,
    DrugName,
    DrugClass,
    FillDate,
    PrescriptionDate,
    SubmittedAt,
    ReversalDate,
    Quantity,
    DaysSupply,
    AllowedAmount,
    PaidAmount,
    PlanPaidAmount,
    CopayAmount,
    IngredientCost,
    DispensingFee,
    PrescriberNpi,
    PharmacyNpi,
    PlanId,
    State,
    Status,
}

impl ClaimField {
    /// 金额字段解析时固定保留两位小数
    pub fn is_money(self) -> bool {
        matches!(
            self,
            Self::AllowedAmount
                | Self::PaidAmount
                | Self::PlanPaidAmount
                | Self::CopayAmount
                | Self::IngredientCost
                | Self::DispensingFee
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_money() || matches!(self, Self::Quantity | Self::DaysSupply)
    }

    pub fn is_date(self) -> bool {
        matches!(
            self,
            Self::FillDate | Self::PrescriptionDate | Self::ReversalDate | Self::SubmittedAt
        )
    }
}

impl fmt::Display for ClaimField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TenantId => "tenant_id",
            Self::ClaimNumber => "claim_number",
            Self::PatientId => "patient_id",
            Self::RxNumber => "rx_number",
            Self::Ndc => "ndc",
            Self::DrugName => "drug_name",
            Self::DrugClass => "drug_class",
            Self::FillDate => "fill_date",
            Self::PrescriptionDate => "prescription_date",
            Self::SubmittedAt => "submitted_at",
            Self::ReversalDate => "reversal_date",
            Self::Quantity => "quantity",
            Self::DaysSupply => "days_supply",
            Self::AllowedAmount => "allowed_amount",
            Self::PaidAmount => "paid_amount",
            Self::PlanPaidAmount => "plan_paid_amount",
            Self::CopayAmount => "copay_amount",
            Self::IngredientCost => "ingredient_cost",
            Self::DispensingFee => "dispensing_fee",
            Self::PrescriberNpi => "prescriber_npi",
            Self::PharmacyNpi => "pharmacy_npi",
            Self::PlanId => "plan_id",
            Self::State => "state",
            Self::Status => "status",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ClaimField {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| EngineError::UnknownField(s.to_string()))
    }
}

/// 解析后的字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// 数值视图，非数值返回 None（数值比较据此判定失败闭合）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// 日期视图，DateTime 截断到日期
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// 文本视图，数值和日期按标准格式渲染
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// 整数值不带小数位渲染，避免 "30.0" 与 "30" 不一致
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// 宽松日期反序列化：严格按 %Y-%m-%d 解析，格式非法得到 None
mod lenient_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
    }
}

/// 宽松时间戳反序列化：严格按 %Y-%m-%d %H:%M:%S 解析，格式非法得到 None
mod lenient_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()))
    }
}

/// 一条药房报销记录
///
/// 摄入后不可变，归属于创建它的批次作业。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub tenant_id: String,
    pub claim_number: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub rx_number: Option<String>,
    #[serde(default)]
    pub ndc: Option<String>,
    #[serde(default)]
    pub drug_name: Option<String>,
    #[serde(default)]
    pub drug_class: Option<String>,
    #[serde(default, deserialize_with = "lenient_date::deserialize")]
    pub fill_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date::deserialize")]
    pub prescription_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_datetime::deserialize")]
    pub submitted_at: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_date::deserialize")]
    pub reversal_date: Option<NaiveDate>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub days_supply: Option<f64>,
    #[serde(default)]
    pub allowed_amount: Option<f64>,
    #[serde(default)]
    pub paid_amount: Option<f64>,
    #[serde(default)]
    pub plan_paid_amount: Option<f64>,
    #[serde(default)]
    pub copay_amount: Option<f64>,
    #[serde(default)]
    pub ingredient_cost: Option<f64>,
    #[serde(default)]
    pub dispensing_fee: Option<f64>,
    #[serde(default)]
    pub prescriber_npi: Option<String>,
    #[serde(default)]
    pub pharmacy_npi: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Claim {
    /// 解析命名字段的值（纯函数，无副作用）
    ///
    /// 金额字段四舍五入到两位小数；缺失字段返回 None。
    pub fn resolve(&self, field: ClaimField) -> Option<FieldValue> {
        match field {
            ClaimField::TenantId => Some(FieldValue::Text(self.tenant_id.clone())),
            ClaimField::ClaimNumber => Some(FieldValue::Text(self.claim_number.clone())),
            ClaimField::PatientId => self.patient_id.clone().map(FieldValue::Text),
            ClaimField::RxNumber => self.rx_number.clone().map(FieldValue::Text),
            ClaimField::Ndc => self.ndc.clone().map(FieldValue::Text),
            ClaimField::DrugName => self.drug_name.clone().map(FieldValue::Text),
            ClaimField::DrugClass => self.drug_class.clone().map(FieldValue::Text),
            ClaimField::FillDate => self.fill_date.map(FieldValue::Date),
            ClaimField::PrescriptionDate => self.prescription_date.map(FieldValue::Date),
            ClaimField::SubmittedAt => self.submitted_at.map(FieldValue::DateTime),
            ClaimField::ReversalDate => self.reversal_date.map(FieldValue::Date),
            ClaimField::Quantity => self.quantity.map(FieldValue::Number),
            ClaimField::DaysSupply => self.days_supply.map(FieldValue::Number),
            ClaimField::AllowedAmount => self.allowed_amount.map(money),
            ClaimField::PaidAmount => self.paid_amount.map(money),
            ClaimField::PlanPaidAmount => self.plan_paid_amount.map(money),
            ClaimField::CopayAmount => self.copay_amount.map(money),
            ClaimField::IngredientCost => self.ingredient_cost.map(money),
            ClaimField::DispensingFee => self.dispensing_fee.map(money),
            ClaimField::PrescriberNpi => self.prescriber_npi.clone().map(FieldValue::Text),
            ClaimField::PharmacyNpi => self.pharmacy_npi.clone().map(FieldValue::Text),
            ClaimField::PlanId => self.plan_id.clone().map(FieldValue::Text),
            ClaimField::State => self.state.clone().map(FieldValue::Text),
            ClaimField::Status => self.status.clone().map(FieldValue::Text),
        }
    }

    /// 确定性排序键：日期字段升序，记录编号升序
    ///
    /// 跨记录策略依赖该顺序保证重复运行产生完全一致的标记集合。
    pub fn sort_key(&self, date_field: ClaimField) -> (Option<NaiveDate>, &str) {
        let date = self.resolve(date_field).and_then(|v| v.as_date());
        (date, &self.claim_number)
    }
}

/// 金额统一到两位小数
fn money(v: f64) -> FieldValue {
    FieldValue::Number((v * 100.0).round() / 100.0)
}
