//! 运行编排器
//!
//! 一次运行：登记 → 对活跃规则当前版本做编译快照 → 逐规则应用策略 →
//! 一次性记录全部标记 → 写入统计收尾。标记出处（规则版本）钉在快照时刻，
//! 运行期间的规则编辑不影响本次运行。全有或全无：批次级故障转 FAILED，
//! 已计算的标记全部丢弃，不记录部分结果。

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::claim::Claim;
use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::models::{Flag, ReviewState, Run};
use crate::recorder::FlagRecorder;
use crate::runs::{RuleApplication, RunRegistry};
use crate::store::RuleVersionStore;
use crate::strategy;

#[derive(Clone)]
pub struct RunOrchestrator {
    store: RuleVersionStore,
    recorder: FlagRecorder,
    runs: RunRegistry,
}

impl RunOrchestrator {
    pub fn new(store: RuleVersionStore, recorder: FlagRecorder, runs: RunRegistry) -> Self {
        Self {
            store,
            recorder,
            runs,
        }
    }

    /// 对一个批次执行全部活跃规则
    ///
    /// 返回终态的运行记录；批次级故障（含超时）不向上传播，
    /// 体现在返回运行的 FAILED 状态与 error_message 上。
    /// 唯一的前置错误是同作业的运行冲突。
    #[instrument(skip(self, claims), fields(claims = claims.len()))]
    pub fn execute(
        &self,
        job_id: Option<Uuid>,
        claims: &[Claim],
        timeout: Option<Duration>,
    ) -> Result<Run> {
        let run = self.runs.begin(job_id)?;

        match self.run_batch(&run, claims, timeout) {
            Ok((flags, applications)) => {
                let flags_generated = flags.len() as u64;
                let rules_executed = applications.len() as u64;
                self.recorder.record(run.id, flags);
                self.runs.record_applications(run.id, applications);
                self.runs
                    .complete(run.id, claims.len() as u64, rules_executed, flags_generated)
            }
            Err(e) => self.runs.fail(run.id, e.to_string()),
        }
    }

    fn run_batch(
        &self,
        run: &Run,
        claims: &[Claim],
        timeout: Option<Duration>,
    ) -> Result<(Vec<Flag>, Vec<RuleApplication>)> {
        let started = Instant::now();
        let deadline = match timeout {
            Some(limit) => strategy::Deadline::at(started + limit),
            None => strategy::Deadline::none(),
        };
        let snapshot = self.store.snapshot_active()?;
        self.runs.mark_processing(run.id)?;

        // 同一运行的标记共用一个时间戳，标记集对相同输入字节一致
        let flagged_at = Utc::now();
        let mut flags = Vec::new();
        let mut applications = Vec::with_capacity(snapshot.len());

        for rule in &snapshot {
            // 预算在规则边界和策略内部（分组/分段）双重检查
            deadline.check()?;
            let candidates = strategy::apply(rule, claims, deadline)?;
            info!(
                rule_code = %rule.code,
                version = rule.version,
                flags = candidates.len(),
                "规则已应用"
            );
            applications.push(RuleApplication {
                rule_id: rule.rule_id,
                rule_code: rule.code.clone(),
                rule_name: rule.name.clone(),
                rule_version: rule.version,
                flags: candidates.len() as u64,
            });
            for candidate in candidates {
                flags.push(Self::bind(run, rule, flagged_at, candidate));
            }
        }

        Ok((flags, applications))
    }

    /// 把标记候选绑定到运行与规则版本出处
    fn bind(
        run: &Run,
        rule: &CompiledRule,
        flagged_at: chrono::DateTime<Utc>,
        candidate: crate::models::FlagCandidate,
    ) -> Flag {
        Flag {
            id: Uuid::new_v4(),
            run_id: run.id,
            job_id: run.job_id,
            claim_number: candidate.claim_number,
            rule_id: rule.rule_id,
            rule_code: rule.code.clone(),
            rule_name: rule.name.clone(),
            rule_version: rule.version,
            severity: rule.severity,
            category: rule.category,
            explanation: candidate.explanation,
            flagged_at,
            review: ReviewState::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::models::{RuleCategory, RuleSpec, Severity};
    use crate::recorder::FlagFilter;
    use serde_json::json;

    fn harness() -> (RuleVersionStore, FlagRecorder, RunRegistry, RunOrchestrator) {
        let store = RuleVersionStore::new();
        let recorder = FlagRecorder::new();
        let runs = RunRegistry::new();
        let orchestrator = RunOrchestrator::new(store.clone(), recorder.clone(), runs.clone());
        (store, recorder, runs, orchestrator)
    }

    fn quantity_rule(threshold: f64) -> RuleSpec {
        RuleSpec {
            name: "High quantity".to_string(),
            code: "DR-001".to_string(),
            description: None,
            category: RuleCategory::QtyDaysSupply,
            severity: Severity::Financial,
            is_active: true,
            rule_definition: serde_json::from_value(json!({
                "logic_type": "SIMPLE",
                "conditions": [
                    {"field": "quantity", "operator": "gt", "value": threshold}
                ]
            }))
            .unwrap(),
        }
    }

    fn claims() -> Vec<Claim> {
        vec![
            serde_json::from_value(json!({
                "tenant_id": "t1",
                "claim_number": "C-1",
                "quantity": 95.0,
                "fill_date": "2024-03-01"
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "tenant_id": "t1",
                "claim_number": "C-2",
                "quantity": 30.0,
                "fill_date": "2024-03-02"
            }))
            .unwrap(),
        ]
    }

    #[test]
    fn test_simple_rule_flags_expected_claim() {
        let (store, recorder, runs, orchestrator) = harness();
        store.create(quantity_rule(90.0), None).unwrap();

        let run = orchestrator.execute(None, &claims(), None).unwrap();
        assert_eq!(run.status, crate::models::RunStatus::Completed);
        assert_eq!(run.claims_processed, 2);
        assert_eq!(run.rules_executed, 1);
        assert_eq!(run.flags_generated, 1);

        let flags = recorder.list(&FlagFilter {
            run_id: Some(run.id),
            ..Default::default()
        });
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].claim_number, "C-1");
        assert_eq!(flags[0].rule_version, 1);
        assert_eq!(flags[0].rule_code, "DR-001");

        // 应用清单包含钉定的版本与标记计数
        let applications = runs.applications(run.id);
        assert_eq!(applications.len(), 1);
        assert_eq!(applications[0].rule_code, "DR-001");
        assert_eq!(applications[0].rule_version, 1);
        assert_eq!(applications[0].flags, 1);
    }

    #[test]
    fn test_determinism_across_runs() {
        let (store, recorder, _, orchestrator) = harness();
        store.create(quantity_rule(90.0), None).unwrap();
        let batch = claims();

        let r1 = orchestrator.execute(None, &batch, None).unwrap();
        let r2 = orchestrator.execute(None, &batch, None).unwrap();

        let key = |run_id: Uuid| {
            recorder
                .list(&FlagFilter {
                    run_id: Some(run_id),
                    ..Default::default()
                })
                .into_iter()
                .map(|f| (f.claim_number, f.rule_code, f.rule_version, f.explanation))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(r1.id), key(r2.id));
    }

    #[test]
    fn test_version_pinning_survives_rule_edits() {
        let (store, recorder, _, orchestrator) = harness();
        let rule = store.create(quantity_rule(90.0), None).unwrap();

        let run = orchestrator.execute(None, &claims(), None).unwrap();

        // 运行结束后修改规则定义，已记录标记的版本不得变化
        store.update(rule.id, quantity_rule(10.0), None, None).unwrap();

        let flags = recorder.list(&FlagFilter {
            run_id: Some(run.id),
            ..Default::default()
        });
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].rule_version, 1);

        // 新运行用新版本，标记到两条记录
        let run2 = orchestrator.execute(None, &claims(), None).unwrap();
        let flags2 = recorder.list(&FlagFilter {
            run_id: Some(run2.id),
            ..Default::default()
        });
        assert_eq!(flags2.len(), 2);
        assert!(flags2.iter().all(|f| f.rule_version == 2));
    }

    #[test]
    fn test_inactive_rules_not_executed() {
        let (store, _, _, orchestrator) = harness();
        let rule = store.create(quantity_rule(90.0), None).unwrap();
        store.set_active(rule.id, false, None).unwrap();

        let run = orchestrator.execute(None, &claims(), None).unwrap();
        assert_eq!(run.rules_executed, 0);
        assert_eq!(run.flags_generated, 0);
    }

    #[test]
    fn test_empty_batch_completes_with_zero_flags() {
        let (store, _, _, orchestrator) = harness();
        store.create(quantity_rule(90.0), None).unwrap();

        let run = orchestrator.execute(None, &[], None).unwrap();
        assert_eq!(run.status, crate::models::RunStatus::Completed);
        assert_eq!(run.claims_processed, 0);
        assert_eq!(run.flags_generated, 0);
    }

    #[test]
    fn test_timeout_fails_run_without_flags() {
        let (store, recorder, _, orchestrator) = harness();
        store.create(quantity_rule(90.0), None).unwrap();

        let run = orchestrator
            .execute(None, &claims(), Some(Duration::ZERO))
            .unwrap();
        assert_eq!(run.status, crate::models::RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("超时"));

        // 全有或全无：失败运行不留任何标记
        let flags = recorder.list(&FlagFilter {
            run_id: Some(run.id),
            ..Default::default()
        });
        assert!(flags.is_empty());
    }

    #[test]
    fn test_absurd_days_supply_completes_and_releases_job() {
        // 畸形但合法的输入（天文数字的供应天数）不得让运行卡在非终态，
        // 作业锁必须在运行收尾时释放
        let (store, _, runs, orchestrator) = harness();
        store
            .create(RuleSpec {
                name: "Overlapping supply".to_string(),
                code: "DR-033".to_string(),
                description: None,
                category: RuleCategory::DuplicateBilling,
                severity: Severity::Financial,
                is_active: true,
                rule_definition: serde_json::from_value(json!({
                    "logic_type": "OVERLAP",
                    "keys": ["tenant_id", "patient_id"],
                    "date_field": "fill_date",
                    "days_supply_field": "days_supply"
                }))
                .unwrap(),
            }, None)
            .unwrap();

        let batch: Vec<Claim> = vec![
            serde_json::from_value(json!({
                "tenant_id": "t1",
                "claim_number": "C-1",
                "patient_id": "p1",
                "fill_date": "2024-01-01",
                "days_supply": 1e300
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "tenant_id": "t1",
                "claim_number": "C-2",
                "patient_id": "p1",
                "fill_date": "2024-01-15",
                "days_supply": 30.0
            }))
            .unwrap(),
        ];

        let job_id = Uuid::new_v4();
        let run = orchestrator.execute(Some(job_id), &batch, None).unwrap();
        assert!(run.status.is_terminal());
        assert_eq!(run.status, crate::models::RunStatus::Completed);
        assert_eq!(run.flags_generated, 0);

        // 作业锁已释放，同作业可以再次运行
        assert!(runs.begin(Some(job_id)).is_ok());
    }

    #[test]
    fn test_job_conflict_rejected_before_run_starts() {
        let (store, _, runs, orchestrator) = harness();
        store.create(quantity_rule(90.0), None).unwrap();
        let job_id = Uuid::new_v4();

        let pending = runs.begin(Some(job_id)).unwrap();
        let err = orchestrator.execute(Some(job_id), &claims(), None).unwrap_err();
        assert!(matches!(err, EngineError::RunConflict(_)));

        runs.complete(pending.id, 0, 0, 0).unwrap();
        assert!(orchestrator.execute(Some(job_id), &claims(), None).is_ok());
    }
}
