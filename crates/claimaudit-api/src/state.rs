//! 应用状态定义
//!
//! Axum 路由共享的应用状态：引擎各组件本身以 Arc 共享内部数据，
//! 克隆是廉价的句柄复制。

use audit_shared::config::RunConfig;
use fraud_engine::{FlagRecorder, RuleVersionStore, RunOrchestrator, RunRegistry};

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: RuleVersionStore,
    pub recorder: FlagRecorder,
    pub runs: RunRegistry,
    pub orchestrator: RunOrchestrator,
    /// 批次上限与运行超时
    pub run_config: RunConfig,
}

impl AppState {
    pub fn new(run_config: RunConfig) -> Self {
        let store = RuleVersionStore::new();
        let recorder = FlagRecorder::new();
        let runs = RunRegistry::new();
        let orchestrator = RunOrchestrator::new(store.clone(), recorder.clone(), runs.clone());
        Self {
            store,
            recorder,
            runs,
            orchestrator,
            run_config,
        }
    }
}
