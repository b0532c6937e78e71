//! 运行注册表
//!
//! 维护运行记录与状态机（PENDING → PROCESSING → COMPLETED | FAILED）。
//! 同一批次作业同一时刻至多一个非终态运行，冲突在创建时拒绝。

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Run, RunStatus};

/// 一次运行中某条规则的应用记录（版本钉在快照时刻，含零标记的规则）
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleApplication {
    pub rule_id: Uuid,
    pub rule_code: String,
    pub rule_name: String,
    pub rule_version: u32,
    pub flags: u64,
}

#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<DashMap<Uuid, Run>>,
    /// 作业 id 到活跃（非终态）运行 id 的索引
    active_jobs: Arc<DashMap<Uuid, Uuid>>,
    /// 运行 id 到本次运行应用的规则版本清单
    applications: Arc<DashMap<Uuid, Vec<RuleApplication>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新运行，同作业已有活跃运行时报 RunConflict
    #[instrument(skip(self))]
    pub fn begin(&self, job_id: Option<Uuid>) -> Result<Run> {
        let run = Run {
            id: Uuid::new_v4(),
            job_id,
            status: RunStatus::Pending,
            claims_processed: 0,
            rules_executed: 0,
            flags_generated: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        // entry API 保证并发 begin 同一作业只有一个成功
        if let Some(job_id) = job_id {
            match self.active_jobs.entry(job_id) {
                dashmap::Entry::Occupied(_) => {
                    warn!(%job_id, "作业已有活跃运行，拒绝新运行");
                    return Err(EngineError::RunConflict(job_id));
                }
                dashmap::Entry::Vacant(vacant) => {
                    vacant.insert(run.id);
                }
            }
        }

        self.runs.insert(run.id, run.clone());
        info!(run_id = %run.id, "运行已登记");
        Ok(run)
    }

    pub fn mark_processing(&self, run_id: Uuid) -> Result<Run> {
        self.transition(run_id, |run| {
            run.status = RunStatus::Processing;
        })
    }

    /// 运行成功收尾，写入统计并进入终态
    #[instrument(skip(self))]
    pub fn complete(
        &self,
        run_id: Uuid,
        claims_processed: u64,
        rules_executed: u64,
        flags_generated: u64,
    ) -> Result<Run> {
        let run = self.transition(run_id, |run| {
            run.status = RunStatus::Completed;
            run.claims_processed = claims_processed;
            run.rules_executed = rules_executed;
            run.flags_generated = flags_generated;
            run.completed_at = Some(Utc::now());
        })?;
        self.release_job(&run);
        info!(%run_id, claims_processed, flags_generated, "运行完成");
        Ok(run)
    }

    /// 运行失败：整体转 FAILED，统计清零（部分结果不外泄）
    #[instrument(skip(self, message))]
    pub fn fail(&self, run_id: Uuid, message: String) -> Result<Run> {
        let run = self.transition(run_id, |run| {
            run.status = RunStatus::Failed;
            run.error_message = Some(message.clone());
            run.completed_at = Some(Utc::now());
        })?;
        self.release_job(&run);
        warn!(%run_id, error = %message, "运行失败");
        Ok(run)
    }

    /// 记录本次运行应用的规则版本清单（成功收尾时由编排器写入）
    pub fn record_applications(&self, run_id: Uuid, applications: Vec<RuleApplication>) {
        self.applications.insert(run_id, applications);
    }

    /// 本次运行应用的规则版本清单，编码升序
    pub fn applications(&self, run_id: Uuid) -> Vec<RuleApplication> {
        self.applications
            .get(&run_id)
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, run_id: Uuid) -> Result<Run> {
        self.runs
            .get(&run_id)
            .map(|r| r.clone())
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// 全部运行，开始时间倒序（最新在前），同刻按 id 决胜
    pub fn list(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.iter().map(|r| r.clone()).collect();
        runs.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        runs
    }

    fn transition(&self, run_id: Uuid, apply: impl FnOnce(&mut Run)) -> Result<Run> {
        let mut run = self
            .runs
            .get_mut(&run_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(EngineError::RunFailure(format!(
                "运行 {} 已处于终态 {}",
                run_id, run.status
            )));
        }
        apply(&mut run);
        Ok(run.clone())
    }

    fn release_job(&self, run: &Run) {
        if let Some(job_id) = run.job_id {
            self.active_jobs
                .remove_if(&job_id, |_, active| *active == run.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let registry = RunRegistry::new();
        let run = registry.begin(None).unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        registry.mark_processing(run.id).unwrap();
        let done = registry.complete(run.id, 100, 5, 7).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.claims_processed, 100);
        assert_eq!(done.flags_generated, 7);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let registry = RunRegistry::new();
        let run = registry.begin(None).unwrap();
        registry.fail(run.id, "boom".to_string()).unwrap();

        assert!(registry.complete(run.id, 1, 1, 1).is_err());
        let current = registry.get(run.id).unwrap();
        assert_eq!(current.status, RunStatus::Failed);
        assert_eq!(current.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_one_active_run_per_job() {
        let registry = RunRegistry::new();
        let job_id = Uuid::new_v4();

        let first = registry.begin(Some(job_id)).unwrap();
        let err = registry.begin(Some(job_id)).unwrap_err();
        assert!(matches!(err, EngineError::RunConflict(_)));

        // 终态后同作业允许新运行
        registry.complete(first.id, 0, 0, 0).unwrap();
        assert!(registry.begin(Some(job_id)).is_ok());
    }

    #[test]
    fn test_jobless_runs_never_conflict() {
        let registry = RunRegistry::new();
        registry.begin(None).unwrap();
        assert!(registry.begin(None).is_ok());
    }

    #[test]
    fn test_list_newest_first() {
        let registry = RunRegistry::new();
        let r1 = registry.begin(None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let r2 = registry.begin(None).unwrap();

        let runs = registry.list();
        assert_eq!(runs[0].id, r2.id);
        assert_eq!(runs[1].id, r1.id);
    }
}
