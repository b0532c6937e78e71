//! 规则版本存储
//!
//! 每条规则是「可变的当前指针 + 只追加的版本日志」：定义、分类、严重性
//! 或启用状态变化时追加一个不可变快照，版本号在条目写锁内分配，
//! 同一规则的并发编辑被串行化，版本号严格递增不重复。
//! DashMap 提供条目级并发，不同规则的编辑互不阻塞。

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{EngineError, Result};
use crate::models::{Rule, RuleCategory, RuleSpec, RuleVersion, Severity};

/// 单条规则的条目：当前状态 + 完整版本历史
struct RuleEntry {
    rule: Rule,
    /// 只追加，下标 i 即版本 i+1
    versions: Vec<RuleVersion>,
}

impl RuleEntry {
    fn append_version(&mut self, created_by: Option<String>) {
        self.versions.push(RuleVersion {
            rule_id: self.rule.id,
            version: self.rule.version,
            rule_definition: self.rule.rule_definition.clone(),
            category: self.rule.category,
            severity: self.rule.severity,
            is_active: self.rule.is_active,
            created_by,
            created_at: self.rule.updated_at,
        });
    }
}

/// 规则列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub category: Option<RuleCategory>,
    pub severity: Option<Severity>,
    pub is_active: Option<bool>,
}

/// 批量导入结果：逐条独立校验，坏条目计入 failed 不影响其余
#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkOutcome {
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// 规则版本存储
#[derive(Clone, Default)]
pub struct RuleVersionStore {
    entries: Arc<DashMap<Uuid, Arc<RwLock<RuleEntry>>>>,
    /// 规则编码到 id 的索引，编码在存储内唯一
    codes: Arc<DashMap<String, Uuid>>,
}

impl RuleVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 创建规则，初始版本固定为 1
    ///
    /// 定义在入库前校验，无效定义不会产生任何版本记录。
    #[instrument(skip(self, spec), fields(code = %spec.code))]
    pub fn create(&self, spec: RuleSpec, created_by: Option<String>) -> Result<Rule> {
        Self::validate_code(&spec.code)?;
        RuleCompiler::validate(&spec.rule_definition)?;

        // 编码索引的 entry API 保证并发创建同码只有一个成功
        let id = Uuid::new_v4();
        match self.codes.entry(spec.code.clone()) {
            dashmap::Entry::Occupied(_) => {
                return Err(EngineError::DuplicateRuleCode(spec.code));
            }
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let now = Utc::now();
        let rule = Rule {
            id,
            code: spec.code,
            name: spec.name,
            description: spec.description,
            category: spec.category,
            severity: spec.severity,
            is_active: spec.is_active,
            version: 1,
            rule_definition: spec.rule_definition,
            created_by: created_by.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut entry = RuleEntry {
            rule: rule.clone(),
            versions: Vec::new(),
        };
        entry.append_version(created_by);
        self.entries.insert(id, Arc::new(RwLock::new(entry)));

        info!(rule_id = %id, "规则已创建");
        Ok(rule)
    }

    /// 更新规则，版本号在条目写锁内 +1（原子分配，并发编辑串行化）
    ///
    /// `expected_version` 用于乐观并发控制，与当前版本不符时拒绝。
    #[instrument(skip(self, spec))]
    pub fn update(
        &self,
        id: Uuid,
        spec: RuleSpec,
        expected_version: Option<u32>,
        updated_by: Option<String>,
    ) -> Result<Rule> {
        Self::validate_code(&spec.code)?;
        RuleCompiler::validate(&spec.rule_definition)?;

        let entry = self.entry(id)?;
        let mut guard = entry.write();

        if let Some(expected) = expected_version
            && guard.rule.version != expected
        {
            return Err(EngineError::VersionConflict {
                rule_id: id,
                expected: guard.rule.version,
            });
        }

        // 编码变更需要保持唯一并更新索引
        if spec.code != guard.rule.code {
            match self.codes.entry(spec.code.clone()) {
                dashmap::Entry::Occupied(_) => {
                    return Err(EngineError::DuplicateRuleCode(spec.code));
                }
                dashmap::Entry::Vacant(vacant) => {
                    vacant.insert(id);
                }
            }
            self.codes.remove(&guard.rule.code);
        }

        guard.rule.code = spec.code;
        guard.rule.name = spec.name;
        guard.rule.description = spec.description;
        guard.rule.category = spec.category;
        guard.rule.severity = spec.severity;
        guard.rule.is_active = spec.is_active;
        guard.rule.rule_definition = spec.rule_definition;
        guard.rule.version += 1;
        guard.rule.updated_at = Utc::now();
        guard.append_version(updated_by);

        info!(rule_id = %id, version = guard.rule.version, "规则已更新");
        Ok(guard.rule.clone())
    }

    /// 切换启用状态（产生新版本）
    #[instrument(skip(self))]
    pub fn set_active(&self, id: Uuid, is_active: bool, updated_by: Option<String>) -> Result<Rule> {
        let entry = self.entry(id)?;
        let mut guard = entry.write();

        if guard.rule.is_active == is_active {
            return Ok(guard.rule.clone());
        }

        guard.rule.is_active = is_active;
        guard.rule.version += 1;
        guard.rule.updated_at = Utc::now();
        guard.append_version(updated_by);

        info!(rule_id = %id, is_active, version = guard.rule.version, "规则状态已切换");
        Ok(guard.rule.clone())
    }

    /// 软删除：停用规则，历史与编码保留（历史标记仍可追溯到该规则）
    #[instrument(skip(self))]
    pub fn soft_delete(&self, id: Uuid, deleted_by: Option<String>) -> Result<Rule> {
        let rule = self.set_active(id, false, deleted_by)?;
        info!(rule_id = %id, "规则已软删除");
        Ok(rule)
    }

    pub fn get(&self, id: Uuid) -> Result<Rule> {
        Ok(self.entry(id)?.read().rule.clone())
    }

    /// 按过滤条件列出规则，编码升序保证遍历顺序确定
    pub fn list(&self, filter: &RuleFilter) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .entries
            .iter()
            .map(|e| e.value().read().rule.clone())
            .filter(|r| {
                filter.category.is_none_or(|c| r.category == c)
                    && filter.severity.is_none_or(|s| r.severity == s)
                    && filter.is_active.is_none_or(|a| r.is_active == a)
            })
            .collect();
        rules.sort_by(|a, b| a.code.cmp(&b.code));
        rules
    }

    /// 版本历史，新版本在前
    pub fn versions(&self, id: Uuid) -> Result<Vec<RuleVersion>> {
        let entry = self.entry(id)?;
        let guard = entry.read();
        let mut versions = guard.versions.clone();
        versions.reverse();
        Ok(versions)
    }

    pub fn version(&self, id: Uuid, version: u32) -> Result<RuleVersion> {
        let entry = self.entry(id)?;
        let guard = entry.read();
        guard
            .versions
            .get(version.checked_sub(1).ok_or(EngineError::RuleNotFound(id))? as usize)
            .cloned()
            .ok_or(EngineError::RuleNotFound(id))
    }

    pub fn current_version(&self, id: Uuid) -> Result<u32> {
        Ok(self.entry(id)?.read().rule.version)
    }

    /// 对全部活跃规则的当前版本做一次编译快照（运行开始时调用一次）
    ///
    /// 运行期间的规则编辑不影响已取走的快照，这是版本钉定的实现点。
    pub fn snapshot_active(&self) -> Result<Vec<CompiledRule>> {
        let mut compiled = Vec::new();
        for entry in self.entries.iter() {
            let guard = entry.value().read();
            if !guard.rule.is_active {
                continue;
            }
            // 当前版本必然存在且入库前已通过校验
            let snapshot = guard
                .versions
                .last()
                .ok_or_else(|| EngineError::RunFailure("规则条目缺少版本记录".to_string()))?;
            compiled.push(RuleCompiler::compile(
                guard.rule.id,
                &guard.rule.code,
                &guard.rule.name,
                snapshot,
            )?);
        }
        compiled.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(compiled)
    }

    /// 批量导入：逐条独立校验，坏条目不中断其余
    #[instrument(skip(self, specs))]
    pub fn bulk_create(&self, specs: Vec<RuleSpec>, created_by: Option<String>) -> BulkOutcome {
        let mut outcome = BulkOutcome {
            created: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for spec in specs {
            let code = spec.code.clone();
            match self.create(spec, created_by.clone()) {
                Ok(_) => outcome.created += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(format!("{}: {}", code, e));
                }
            }
        }

        if outcome.failed > 0 {
            warn!(created = outcome.created, failed = outcome.failed, "批量导入部分失败");
        } else {
            info!(created = outcome.created, "批量导入完成");
        }
        outcome
    }

    fn entry(&self, id: Uuid) -> Result<Arc<RwLock<RuleEntry>>> {
        self.entries
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::RuleNotFound(id))
    }

    /// 编码格式 DR-###
    fn validate_code(code: &str) -> Result<()> {
        let digits = code.strip_prefix("DR-");
        let valid = digits.is_some_and(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(EngineError::InvalidDefinition(format!(
                "规则编码格式应为 DR-###，当前 '{}'",
                code
            )));
        }
        Ok(())
    }
}
