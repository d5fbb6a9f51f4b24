//! Evaluate -> persist -> select -> upload -> score -> export, end to end.

use claim_fraud_review::config::AppConfig;
use claim_fraud_review::{
    build_registry, evaluate_with_clock, select_best, Dataset, FixedClock, JsonFileStore, Outcome,
    PerformanceStore, ReviewWorkflow, SessionPhase,
};
use std::sync::Arc;
use std::time::Duration;

/// 20 ordinary claims plus two that are extreme on every column.
fn claims_csv(labeled: bool) -> String {
    let mut csv = String::from(if labeled {
        "ClaimAmt,Days,Codes,PotentialFraud\n"
    } else {
        "ClaimAmt,Days,Codes\n"
    });
    let label = |fraud: bool| {
        if !labeled {
            String::new()
        } else if fraud {
            ",1".to_string()
        } else {
            ",0".to_string()
        }
    };

    for i in 0..20 {
        csv.push_str(&format!(
            "{},{},{}{}\n",
            10 + i,
            10 + (19 - i),
            10 + (i + 10) % 20,
            label(false)
        ));
    }
    csv.push_str(&format!("1000,1000,1000{}\n", label(true)));
    csv.push_str(&format!("2000,2000,2000{}\n", label(true)));
    csv
}

#[test]
fn test_full_review_cycle() {
    let dir = tempfile::tempdir().unwrap();

    let mut models = AppConfig::default().models;
    models.enabled = vec!["ECOD".to_string(), "COPOD".to_string()];
    let registry = Arc::new(build_registry(&models).unwrap());

    let validation = Dataset::from_csv_bytes(claims_csv(true).as_bytes()).unwrap();
    let features = validation.feature_matrix("PotentialFraud").unwrap();
    let labels = validation.labels("PotentialFraud").unwrap();

    let table = evaluate_with_clock(
        &registry,
        &features,
        &labels,
        &FixedClock(Duration::from_millis(250)),
    )
    .unwrap();
    assert_eq!(table.names(), vec!["ECOD", "COPOD"]);

    let ecod = table.get("ECOD").unwrap();
    assert_eq!((ecod.precision, ecod.recall, ecod.f1, ecod.mcc), (1.0, 1.0, 1.0, 1.0));
    assert_eq!(ecod.latency_seconds, 0.25);

    // persisted table reads back identically, in order, with `time` as the latency key
    let store = Arc::new(JsonFileStore::new(dir.path().join("json/models_performance.json")));
    store.save(&table).unwrap();
    assert_eq!(store.load().unwrap(), table);
    let json = std::fs::read_to_string(store.path()).unwrap();
    assert!(json.find("ECOD").unwrap() < json.find("COPOD").unwrap());
    assert!(json.contains("\"time\""));

    assert_eq!(select_best(&table), Some("ECOD"));

    let workflow = ReviewWorkflow::new(registry, store, dir.path().join("uploads"));
    let receipt = workflow
        .upload("session-1", claims_csv(false).as_bytes())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(receipt.rows, 22);
    assert_eq!(receipt.selected_model_name.as_deref(), Some("ECOD"));

    let summary = workflow.run_score("session-1").unwrap().completed().unwrap();
    assert_eq!(summary.model_name, "ECOD");
    assert_eq!(summary.flagged, 2);

    let artifact = workflow.run_export("session-1").unwrap().completed().unwrap();
    assert_eq!(artifact.file_name, "fraudulent_claims.csv");
    assert_eq!(
        String::from_utf8(artifact.bytes).unwrap(),
        "ClaimAmt,Days,Codes,PotentialFraud\n1000,1000,1000,1\n2000,2000,2000,1\n"
    );
    assert_eq!(
        workflow.session("session-1").unwrap().phase,
        SessionPhase::Exported
    );
}

#[test]
fn test_repeated_evaluation_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let registry = build_registry(&AppConfig::default().models).unwrap();

    let validation = Dataset::from_csv_bytes(claims_csv(true).as_bytes()).unwrap();
    let features = validation.feature_matrix("PotentialFraud").unwrap();
    let labels = validation.labels("PotentialFraud").unwrap();
    let clock = FixedClock(Duration::from_millis(10));

    let store = JsonFileStore::new(dir.path().join("perf.json"));
    store
        .save(&evaluate_with_clock(&registry, &features, &labels, &clock).unwrap())
        .unwrap();
    let first = std::fs::read(store.path()).unwrap();

    store
        .save(&evaluate_with_clock(&registry, &features, &labels, &clock).unwrap())
        .unwrap();
    let second = std::fs::read(store.path()).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_missing_store_means_no_model() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(build_registry(&AppConfig::default().models).unwrap());
    let store = Arc::new(JsonFileStore::new(dir.path().join("never-written.json")));
    let workflow = ReviewWorkflow::new(registry, store, dir.path().join("uploads"));

    let receipt = workflow
        .upload("s", claims_csv(false).as_bytes())
        .unwrap()
        .completed()
        .unwrap();
    assert!(receipt.selected_model_name.is_none());

    match workflow.run_export("s").unwrap() {
        Outcome::Rejected { message } => assert_eq!(message, "No model selected for scoring"),
        Outcome::Completed(_) => panic!("export must not succeed without a model"),
    }
    assert_eq!(workflow.session("s").unwrap().phase, SessionPhase::Error);
}
