//! 引擎端到端流程测试：建规则 → 执行运行 → 查标记 → 复核

use fraud_engine::{
    Claim, EngineError, FlagFilter, FlagRecorder, RuleCategory, RuleSpec, RuleVersionStore,
    RunOrchestrator, RunRegistry, RunStatus, Severity,
};
use serde_json::json;

fn harness() -> (RuleVersionStore, FlagRecorder, RunOrchestrator) {
    let store = RuleVersionStore::new();
    let recorder = FlagRecorder::new();
    let orchestrator = RunOrchestrator::new(store.clone(), recorder.clone(), RunRegistry::new());
    (store, recorder, orchestrator)
}

fn spec(code: &str, name: &str, definition: serde_json::Value) -> RuleSpec {
    RuleSpec {
        name: name.to_string(),
        code: code.to_string(),
        description: None,
        category: RuleCategory::Utilization,
        severity: Severity::Financial,
        is_active: true,
        rule_definition: serde_json::from_value(definition).unwrap(),
    }
}

fn claim(value: serde_json::Value) -> Claim {
    serde_json::from_value(value).unwrap()
}

#[test]
fn quantity_threshold_end_to_end() {
    let (store, recorder, orchestrator) = harness();
    store
        .create(
            spec(
                "DR-001",
                "High quantity",
                json!({
                    "logic_type": "SIMPLE",
                    "conditions": [{"field": "quantity", "operator": "gt", "value": 90}]
                }),
            ),
            Some("auditor".to_string()),
        )
        .unwrap();

    let claims = vec![
        claim(json!({"tenant_id": "t1", "claim_number": "C-1", "quantity": 95.0})),
        claim(json!({"tenant_id": "t1", "claim_number": "C-2", "quantity": 30.0})),
    ];

    let run = orchestrator.execute(None, &claims, None).unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let flags = recorder.list(&FlagFilter {
        run_id: Some(run.id),
        ..Default::default()
    });
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].claim_number, "C-1");
    assert_eq!(flags[0].rule_version, 1);

    // 复核单向：第二次复核被拒绝
    let flag_id = flags[0].id;
    recorder.review(flag_id, "confirmed".to_string()).unwrap();
    assert!(matches!(
        recorder.review(flag_id, "again".to_string()),
        Err(EngineError::AlreadyReviewed(_))
    ));
}

#[test]
fn overlapping_supply_ranges_flag_both_claims() {
    let (store, recorder, orchestrator) = harness();
    store
        .create(
            spec(
                "DR-033",
                "Overlapping fills",
                json!({
                    "logic_type": "OVERLAP",
                    "keys": ["tenant_id", "patient_id", "drug_name"],
                    "date_field": "fill_date",
                    "days_supply_field": "days_supply"
                }),
            ),
            None,
        )
        .unwrap();

    let claims = vec![
        claim(json!({
            "tenant_id": "t1", "claim_number": "A", "patient_id": "p1",
            "drug_name": "OxyContin", "fill_date": "2024-01-01", "days_supply": 30.0
        })),
        claim(json!({
            "tenant_id": "t1", "claim_number": "B", "patient_id": "p1",
            "drug_name": "OxyContin", "fill_date": "2024-01-15", "days_supply": 30.0
        })),
    ];

    let run = orchestrator.execute(None, &claims, None).unwrap();
    let flags = recorder.list(&FlagFilter {
        run_id: Some(run.id),
        ..Default::default()
    });
    let flagged: Vec<&str> = flags.iter().map(|f| f.claim_number.as_str()).collect();
    assert_eq!(flagged, vec!["A", "B"]);
}

#[test]
fn bulk_upload_counts_invalid_entries_without_aborting() {
    let (store, _, _) = harness();

    let mut specs: Vec<RuleSpec> = (1..=4)
        .map(|i| {
            spec(
                &format!("DR-10{}", i),
                "valid",
                json!({
                    "logic_type": "SIMPLE",
                    "conditions": [{"field": "quantity", "operator": "gt", "value": i * 10}]
                }),
            )
        })
        .collect();
    specs.push(spec(
        "DR-105",
        "broken regex",
        json!({"logic_type": "REGEX", "field": "ndc", "pattern": "[oops"}),
    ));

    let outcome = store.bulk_create(specs, None);
    assert_eq!(outcome.created, 4);
    assert_eq!(outcome.failed, 1);

    for rule in store.list(&Default::default()) {
        assert_eq!(rule.version, 1);
    }
}

#[test]
fn malformed_dates_degrade_to_null_not_errors() {
    let (store, recorder, orchestrator) = harness();
    store
        .create(
            spec(
                "DR-050",
                "Missing fill date",
                json!({
                    "logic_type": "SIMPLE",
                    "conditions": [{"field": "fill_date", "operator": "is_null"}]
                }),
            ),
            None,
        )
        .unwrap();

    // 畸形日期宽松解析为 null，命中 is_null 而不是让运行失败
    let claims = vec![
        claim(json!({"tenant_id": "t1", "claim_number": "C-1", "fill_date": "not-a-date"})),
        claim(json!({"tenant_id": "t1", "claim_number": "C-2", "fill_date": "2024-03-01"})),
    ];

    let run = orchestrator.execute(None, &claims, None).unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let flags = recorder.list(&FlagFilter {
        run_id: Some(run.id),
        ..Default::default()
    });
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].claim_number, "C-1");
}
