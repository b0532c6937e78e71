//! 标记记录器
//!
//! 持久化标记及其完整出处（规则 id/编码/版本、运行 id、严重性、分类、解释），
//! 并提供复核状态转换。按运行 id 幂等：同一运行重复记录是替换而不是追加。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Flag, ReviewState, RuleCategory, Severity};

/// 标记查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct FlagFilter {
    pub run_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub severity: Option<Severity>,
    pub category: Option<RuleCategory>,
    pub reviewed: Option<bool>,
    pub claim_number: Option<String>,
}

/// 标记聚合统计（BTreeMap 保证输出键序稳定）
#[derive(Debug, Clone, serde::Serialize)]
pub struct FlagStats {
    pub total: u64,
    pub reviewed: u64,
    pub pending: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub by_rule: BTreeMap<String, u64>,
}

/// 标记记录器
#[derive(Clone, Default)]
pub struct FlagRecorder {
    flags: Arc<DashMap<Uuid, Flag>>,
    /// 运行 id 到标记 id 的索引，记录替换在此条目的写锁内完成
    by_run: Arc<DashMap<Uuid, Vec<Uuid>>>,
}

impl FlagRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次运行的全部标记
    ///
    /// 幂等：同一运行 id 再次记录会先清掉旧标记（连同其复核状态）再写入新标记。
    #[instrument(skip(self, flags), fields(count = flags.len()))]
    pub fn record(&self, run_id: Uuid, flags: Vec<Flag>) {
        let mut index = self.by_run.entry(run_id).or_default();
        for stale in index.drain(..) {
            self.flags.remove(&stale);
        }
        for flag in flags {
            debug_assert_eq!(flag.run_id, run_id);
            index.push(flag.id);
            self.flags.insert(flag.id, flag);
        }
        info!(%run_id, count = index.len(), "运行标记已记录");
    }

    pub fn get(&self, flag_id: Uuid) -> Result<Flag> {
        self.flags
            .get(&flag_id)
            .map(|f| f.clone())
            .ok_or(EngineError::FlagNotFound(flag_id))
    }

    /// 复核标记：单向转换，二次复核报 AlreadyReviewed，复核时间只设置一次
    #[instrument(skip(self, notes))]
    pub fn review(&self, flag_id: Uuid, notes: String) -> Result<Flag> {
        let mut flag = self
            .flags
            .get_mut(&flag_id)
            .ok_or(EngineError::FlagNotFound(flag_id))?;

        if flag.review.is_reviewed() {
            return Err(EngineError::AlreadyReviewed(flag_id));
        }
        flag.review = ReviewState::Reviewed {
            notes,
            at: Utc::now(),
        };

        info!(%flag_id, "标记已复核");
        Ok(flag.clone())
    }

    /// 按过滤条件查询，(claim_number, rule_code) 升序保证输出稳定
    pub fn list(&self, filter: &FlagFilter) -> Vec<Flag> {
        let mut flags: Vec<Flag> = self
            .flags
            .iter()
            .filter(|f| Self::matches(f.value(), filter))
            .map(|f| f.value().clone())
            .collect();
        flags.sort_by(|a, b| {
            (&a.claim_number, &a.rule_code, a.id).cmp(&(&b.claim_number, &b.rule_code, b.id))
        });
        flags
    }

    pub fn stats(&self, filter: &FlagFilter) -> FlagStats {
        let mut stats = FlagStats {
            total: 0,
            reviewed: 0,
            pending: 0,
            by_severity: BTreeMap::new(),
            by_category: BTreeMap::new(),
            by_rule: BTreeMap::new(),
        };

        for flag in self.flags.iter() {
            if !Self::matches(flag.value(), filter) {
                continue;
            }
            stats.total += 1;
            if flag.review.is_reviewed() {
                stats.reviewed += 1;
            } else {
                stats.pending += 1;
            }
            *stats.by_severity.entry(flag.severity.to_string()).or_default() += 1;
            *stats.by_category.entry(flag.category.to_string()).or_default() += 1;
            *stats.by_rule.entry(flag.rule_code.clone()).or_default() += 1;
        }
        stats
    }

    fn matches(flag: &Flag, filter: &FlagFilter) -> bool {
        filter.run_id.is_none_or(|id| flag.run_id == id)
            && filter.job_id.is_none_or(|id| flag.job_id == Some(id))
            && filter.rule_id.is_none_or(|id| flag.rule_id == id)
            && filter.severity.is_none_or(|s| flag.severity == s)
            && filter.category.is_none_or(|c| flag.category == c)
            && filter
                .reviewed
                .is_none_or(|r| flag.review.is_reviewed() == r)
            && filter
                .claim_number
                .as_ref()
                .is_none_or(|n| flag.claim_number == *n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flag(run_id: Uuid, claim: &str, code: &str) -> Flag {
        Flag {
            id: Uuid::new_v4(),
            run_id,
            job_id: None,
            claim_number: claim.to_string(),
            rule_id: Uuid::new_v4(),
            rule_code: code.to_string(),
            rule_name: "test".to_string(),
            rule_version: 1,
            severity: Severity::Financial,
            category: RuleCategory::QtyDaysSupply,
            explanation: json!({"message": "test"}),
            flagged_at: Utc::now(),
            review: ReviewState::Pending,
        }
    }

    #[test]
    fn test_record_and_list() {
        let recorder = FlagRecorder::new();
        let run_id = Uuid::new_v4();
        recorder.record(run_id, vec![flag(run_id, "C-2", "DR-001"), flag(run_id, "C-1", "DR-001")]);

        let flags = recorder.list(&FlagFilter {
            run_id: Some(run_id),
            ..Default::default()
        });
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].claim_number, "C-1");
        assert_eq!(flags[1].claim_number, "C-2");
    }

    #[test]
    fn test_record_is_idempotent_per_run() {
        let recorder = FlagRecorder::new();
        let run_id = Uuid::new_v4();
        recorder.record(run_id, vec![flag(run_id, "C-1", "DR-001"), flag(run_id, "C-2", "DR-001")]);
        // 重复记录是替换而不是追加
        recorder.record(run_id, vec![flag(run_id, "C-1", "DR-001")]);

        let flags = recorder.list(&FlagFilter {
            run_id: Some(run_id),
            ..Default::default()
        });
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn test_review_is_one_way() {
        let recorder = FlagRecorder::new();
        let run_id = Uuid::new_v4();
        let f = flag(run_id, "C-1", "DR-001");
        let flag_id = f.id;
        recorder.record(run_id, vec![f]);

        let reviewed = recorder.review(flag_id, "合理复配".to_string()).unwrap();
        let first_at = reviewed.review.reviewed_at().unwrap();

        let err = recorder.review(flag_id, "再来一次".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyReviewed(_)));

        // 复核时间只设置一次
        let current = recorder.get(flag_id).unwrap();
        assert_eq!(current.review.reviewed_at().unwrap(), first_at);
        assert_eq!(current.review.notes(), Some("合理复配"));
    }

    #[test]
    fn test_review_missing_flag() {
        let recorder = FlagRecorder::new();
        let err = recorder.review(Uuid::new_v4(), "notes".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::FlagNotFound(_)));
    }

    #[test]
    fn test_filter_by_reviewed_state() {
        let recorder = FlagRecorder::new();
        let run_id = Uuid::new_v4();
        let f1 = flag(run_id, "C-1", "DR-001");
        let id1 = f1.id;
        recorder.record(run_id, vec![f1, flag(run_id, "C-2", "DR-002")]);
        recorder.review(id1, "done".to_string()).unwrap();

        let pending = recorder.list(&FlagFilter {
            reviewed: Some(false),
            ..Default::default()
        });
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].claim_number, "C-2");
    }

    #[test]
    fn test_stats_groupings() {
        let recorder = FlagRecorder::new();
        let run_id = Uuid::new_v4();
        let mut f1 = flag(run_id, "C-1", "DR-001");
        f1.severity = Severity::Compliance;
        recorder.record(
            run_id,
            vec![f1, flag(run_id, "C-2", "DR-001"), flag(run_id, "C-3", "DR-002")],
        );

        let stats = recorder.stats(&FlagFilter {
            run_id: Some(run_id),
            ..Default::default()
        });
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.by_severity["FINANCIAL"], 2);
        assert_eq!(stats.by_severity["COMPLIANCE"], 1);
        assert_eq!(stats.by_rule["DR-001"], 2);
    }
}
