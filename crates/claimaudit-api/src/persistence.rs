//! 启动时规则加载
//!
//! 从 PostgreSQL 的 fraud_rules 表加载启用的规则定义到内存版本存储。
//! 坏行只告警跳过，不阻止服务启动；运行期的写操作全部走内存存储。

use audit_shared::database::Database;
use fraud_engine::{RuleSpec, RuleVersionStore};
use serde_json::{Value, json};
use sqlx::FromRow;
use tracing::{info, warn};

#[derive(Debug, FromRow)]
struct RuleRow {
    code: String,
    name: String,
    description: Option<String>,
    category: String,
    severity: String,
    is_active: bool,
    rule_definition: Value,
    created_by: Option<String>,
}

/// 从数据库加载全部启用的规则
///
/// 逐行解析为规则载荷并经存储校验写入，返回成功加载的条数。
pub async fn load_rules(db: &Database, store: &RuleVersionStore) -> anyhow::Result<usize> {
    let rows = sqlx::query_as::<_, RuleRow>(
        r#"
        SELECT code, name, description, category, severity, is_active,
               rule_definition, created_by
        FROM fraud_rules
        WHERE deleted_at IS NULL
        ORDER BY code
        "#,
    )
    .fetch_all(db.pool())
    .await?;

    let mut loaded = 0;
    for row in rows {
        let code = row.code.clone();
        match parse_spec(row) {
            Ok((spec, created_by)) => {
                if let Err(e) = store.create(spec, created_by) {
                    warn!(code = %code, error = %e, "规则加载失败，已跳过");
                } else {
                    loaded += 1;
                }
            }
            Err(e) => {
                warn!(code = %code, error = %e, "规则定义解析失败，已跳过");
            }
        }
    }

    info!(loaded, "数据库规则加载完成");
    Ok(loaded)
}

fn parse_spec(row: RuleRow) -> Result<(RuleSpec, Option<String>), serde_json::Error> {
    let spec = serde_json::from_value(json!({
        "name": row.name,
        "code": row.code,
        "description": row.description,
        "category": row.category,
        "severity": row.severity,
        "is_active": row.is_active,
        "rule_definition": row.rule_definition,
    }))?;
    Ok((spec, row.created_by))
}
