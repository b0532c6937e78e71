//! 跨条策略：DUPLICATE、DUPLICATE_WINDOW、OVERLAP、COUNT_WINDOW、EARLY_REFILL
//!
//! 分组状态是单次调用内的局部累加器（BTreeMap 保证分组遍历顺序确定），
//! 组内按（date_field 升序，claim_number 升序）排序后再判定，
//! 重复运行同一批次得到字节一致的标记集。
//! 墙钟预算在分组边界检查；OVERLAP 的两两比较在大组内部也定期检查。

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Value, json};

use super::Deadline;
use crate::claim::{Claim, ClaimField};
use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::models::FlagCandidate;

/// OVERLAP 大组内预算检查的步长（外层记录数）
const OVERLAP_DEADLINE_STRIDE: usize = 256;

/// 按声明的键元组分组，键字段缺失的记录无法归组，直接跳过
fn group_by_keys<'a>(
    keys: &[ClaimField],
    claims: &'a [Claim],
) -> BTreeMap<Vec<String>, Vec<&'a Claim>> {
    let mut groups: BTreeMap<Vec<String>, Vec<&Claim>> = BTreeMap::new();
    for claim in claims {
        let key: Option<Vec<String>> = keys
            .iter()
            .map(|f| claim.resolve(*f).map(|v| v.to_text().to_lowercase()))
            .collect();
        if let Some(key) = key {
            groups.entry(key).or_default().push(claim);
        }
    }
    groups
}

/// 组内确定性排序：date_field 升序，claim_number 升序
fn sort_group(group: &mut [&Claim], date_field: ClaimField) {
    group.sort_by(|a, b| a.sort_key(date_field).cmp(&b.sort_key(date_field)));
}

fn candidate(claim: &Claim, explanation: Value) -> FlagCandidate {
    FlagCandidate {
        claim_number: claim.claim_number.clone(),
        explanation,
    }
}

/// DUPLICATE：同键组内保留最早一条（fill_date 升序，claim_number 决胜），
/// 其余 n-1 条全部标记
pub(super) fn duplicate(
    rule: &CompiledRule,
    keys: &[ClaimField],
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    let mut out = Vec::new();
    for (key, mut group) in group_by_keys(keys, claims) {
        deadline.check()?;
        if group.len() < 2 {
            continue;
        }
        sort_group(&mut group, ClaimField::FillDate);
        let earliest = group[0];
        for dup in &group[1..] {
            out.push(candidate(
                dup,
                json!({
                    "message": format!(
                        "报销记录 {} 命中规则 '{}': 与 {} 重复（组大小 {}）",
                        dup.claim_number, rule.name, earliest.claim_number, group.len()
                    ),
                    "group_key": key,
                    "group_size": group.len(),
                    "kept_claim": earliest.claim_number,
                }),
            ));
        }
    }
    Ok(out)
}

/// DUPLICATE_WINDOW：同键组内按 date_field 排序，与前一条相隔不超过
/// window_days 天的后续记录被标记
pub(super) fn duplicate_window(
    rule: &CompiledRule,
    keys: &[ClaimField],
    date_field: ClaimField,
    window_days: i64,
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    let mut out = Vec::new();
    for (key, group) in group_by_keys(keys, claims) {
        deadline.check()?;
        let mut dated: Vec<(NaiveDate, &Claim)> = group
            .into_iter()
            .filter_map(|c| c.resolve(date_field).and_then(|v| v.as_date()).map(|d| (d, c)))
            .collect();
        dated.sort_by(|a, b| (a.0, &a.1.claim_number).cmp(&(b.0, &b.1.claim_number)));

        for pair in dated.windows(2) {
            let (prev_date, prev) = pair[0];
            let (date, cur) = pair[1];
            let gap = (date - prev_date).num_days();
            if gap <= window_days {
                out.push(candidate(
                    cur,
                    json!({
                        "message": format!(
                            "报销记录 {} 命中规则 '{}': 与 {} 相隔 {} 天（窗口 {} 天）",
                            cur.claim_number, rule.name, prev.claim_number, gap, window_days
                        ),
                        "group_key": key,
                        "window_days": window_days,
                        "gap_days": gap,
                        "previous_claim": prev.claim_number,
                        "previous_date": prev_date.format("%Y-%m-%d").to_string(),
                    }),
                ));
            }
        }
    }
    Ok(out)
}

/// OVERLAP：组内任意两条记录的 [date, date + days_supply) 区间相交即双方标记
/// （d1 < d2+s2 且 d2 < d1+s1；相邻区间 d2 == d1+s1 不算相交）。
/// 每条记录每条规则至多标记一次，解释里列出全部相交对象。
/// 供应天数大到日期加法溢出的记录无法构成有限区间，跳过不参与比较。
pub(super) fn overlap(
    rule: &CompiledRule,
    keys: &[ClaimField],
    date_field: ClaimField,
    days_supply_field: ClaimField,
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    let mut out = Vec::new();
    for (key, group) in group_by_keys(keys, claims) {
        deadline.check()?;
        let mut ranged: Vec<(NaiveDate, NaiveDate, i64, &Claim)> = group
            .into_iter()
            .filter_map(|c| {
                let date = c.resolve(date_field).and_then(|v| v.as_date())?;
                let supply = c.resolve(days_supply_field).and_then(|v| v.as_number())?;
                if !(supply > 0.0) {
                    return None;
                }
                // 饱和转换后 checked_add_days 兜底：溢出的区间终点视为无效
                let supply = supply.round() as i64;
                let end = date.checked_add_days(chrono::Days::new(supply as u64))?;
                Some((date, end, supply, c))
            })
            .collect();
        ranged.sort_by(|a, b| (a.0, &a.3.claim_number).cmp(&(b.0, &b.3.claim_number)));

        for (i, (date, end, supply, claim)) in ranged.iter().enumerate() {
            if i % OVERLAP_DEADLINE_STRIDE == 0 {
                deadline.check()?;
            }
            let mut partners = Vec::new();
            for (j, (other_date, other_end, other_supply, other)) in ranged.iter().enumerate() {
                if i == j {
                    continue;
                }
                if *date < *other_end && *other_date < *end {
                    partners.push(json!({
                        "claim_number": other.claim_number,
                        "fill_date": other_date.format("%Y-%m-%d").to_string(),
                        "days_supply": other_supply,
                    }));
                }
            }
            if !partners.is_empty() {
                out.push(candidate(
                    claim,
                    json!({
                        "message": format!(
                            "报销记录 {} 命中规则 '{}': 供应区间与 {} 条记录重叠",
                            claim.claim_number, rule.name, partners.len()
                        ),
                        "group_key": key,
                        "fill_date": date.format("%Y-%m-%d").to_string(),
                        "days_supply": supply,
                        "overlaps_with": partners,
                    }),
                ));
            }
        }
    }
    Ok(out)
}

/// COUNT_WINDOW：组内按 date_field 排序后滑动计数，
/// 以某条记录结尾的 window_days 天窗口内数量超过 threshold 时标记该条
pub(super) fn count_window(
    rule: &CompiledRule,
    keys: &[ClaimField],
    date_field: ClaimField,
    window_days: i64,
    threshold: usize,
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    let mut out = Vec::new();
    for (key, group) in group_by_keys(keys, claims) {
        deadline.check()?;
        let mut dated: Vec<(NaiveDate, &Claim)> = group
            .into_iter()
            .filter_map(|c| c.resolve(date_field).and_then(|v| v.as_date()).map(|d| (d, c)))
            .collect();
        dated.sort_by(|a, b| (a.0, &a.1.claim_number).cmp(&(b.0, &b.1.claim_number)));

        let mut start = 0;
        for (i, (date, claim)) in dated.iter().enumerate() {
            // 窗口覆盖 [date - window_days + 1, date]，共 window_days 个自然日
            while (*date - dated[start].0).num_days() >= window_days {
                start += 1;
            }
            let count = i - start + 1;
            if count > threshold {
                out.push(candidate(
                    claim,
                    json!({
                        "message": format!(
                            "报销记录 {} 命中规则 '{}': {} 天内第 {} 条，超过阈值 {}",
                            claim.claim_number, rule.name, window_days, count, threshold
                        ),
                        "group_key": key,
                        "window_days": window_days,
                        "count_in_window": count,
                        "threshold": threshold,
                        "window_start": dated[start].0.format("%Y-%m-%d").to_string(),
                    }),
                ));
            }
        }
    }
    Ok(out)
}

/// EARLY_REFILL：同药同患者的连续配药中，上一次的供应天数（扣除宽限比例）
/// 尚未耗尽就再次配药的记录被标记
pub(super) fn early_refill(
    rule: &CompiledRule,
    keys: &[ClaimField],
    date_field: ClaimField,
    days_supply_field: ClaimField,
    grace_percent: f64,
    claims: &[Claim],
    deadline: Deadline,
) -> Result<Vec<FlagCandidate>> {
    let mut out = Vec::new();
    for (key, group) in group_by_keys(keys, claims) {
        deadline.check()?;
        let mut fills: Vec<(NaiveDate, Option<f64>, &Claim)> = group
            .into_iter()
            .filter_map(|c| {
                let date = c.resolve(date_field).and_then(|v| v.as_date())?;
                let supply = c.resolve(days_supply_field).and_then(|v| v.as_number());
                Some((date, supply, c))
            })
            .collect();
        fills.sort_by(|a, b| (a.0, &a.2.claim_number).cmp(&(b.0, &b.2.claim_number)));

        for pair in fills.windows(2) {
            let (prev_date, prev_supply, prev) = &pair[0];
            let (date, _, cur) = &pair[1];
            // 上一条没有供应天数就无法判定耗尽时点
            let Some(prev_supply) = prev_supply else {
                continue;
            };
            if *prev_supply <= 0.0 {
                continue;
            }

            let gap = (*date - *prev_date).num_days() as f64;
            let required_gap = prev_supply * (1.0 - grace_percent / 100.0);
            if gap < required_gap {
                let days_early = prev_supply - gap;
                out.push(candidate(
                    cur,
                    json!({
                        "message": format!(
                            "报销记录 {} 命中规则 '{}': 距上次配药仅 {} 天，供应 {} 天（宽限 {}%），提前 {} 天",
                            cur.claim_number, rule.name, gap, prev_supply, grace_percent, days_early
                        ),
                        "group_key": key,
                        "previous_claim": prev.claim_number,
                        "previous_fill_date": prev_date.format("%Y-%m-%d").to_string(),
                        "previous_days_supply": prev_supply,
                        "gap_days": gap,
                        "grace_percent": grace_percent,
                        "days_early": days_early,
                    }),
                ));
            }
        }
    }
    Ok(out)
}
