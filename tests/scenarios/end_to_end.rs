//! Test: full CSV + JSON -> join -> average -> sink runs

use crate::helpers::*;
use datapipe::core::config::{EngineConfig, PipelineConfig};
use datapipe::core::{PipelineRequest, RunStatus, Value};
use datapipe::execution::ExecutionEngine;
use datapipe::intent::RuleBasedResolver;
use datapipe::persistence::{InMemoryRunStore, RunStore};
use datapipe::sinks::Sinks;
use serde_json::json;
use std::sync::Arc;

fn etl_steps(fixture: &Fixture) -> serde_json::Value {
    json!([
        {"op": "read_tabular_csv", "name": "A", "path": fixture.orders()},
        {"op": "read_tabular_json", "name": "B", "path": fixture.users()},
        {"op": "join", "left": "A", "right": "B", "on": "user_id"},
        {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount", "alias": "avg_amount"}
    ])
}

/// Hand-computed from the fixtures: user 2's single order is duplicated by
/// its two cities, user 3 has no amount, user 5 has no orders
fn expected_averages() -> Vec<serde_json::Value> {
    vec![
        json!({"user_id": 1, "avg_amount": 15.0}),
        json!({"user_id": 2, "avg_amount": 5.0}),
        json!({"user_id": 3, "avg_amount": null}),
        json!({"user_id": 4, "avg_amount": 7.5}),
    ]
}

#[tokio::test]
async fn test_grouped_average_preview() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);

    let response = engine
        .submit(PipelineRequest::from_steps(steps(etl_steps(&fixture))))
        .await
        .unwrap();

    assert_eq!(response.status, "ok");
    assert_eq!(sorted_rows(&response.preview), sorted_rows(&expected_averages()));

    let record = store.get(response.run_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Success);
    assert_eq!(record.pipeline_label, "adhoc");
}

#[tokio::test]
async fn test_result_written_to_relational_sink() {
    let fixture = Fixture::new();
    let sink = MockSink::new();
    let engine = engine_with(
        Sinks::local(fixture.output_dir()).with_relational(sink.clone()),
        Arc::new(InMemoryRunStore::new()),
    );

    let mut pipeline = steps(etl_steps(&fixture));
    pipeline.extend(steps(json!([{"op": "write_sink_relational", "table": "test.etl_result"}])));
    engine.submit(PipelineRequest::from_steps(pipeline)).await.unwrap();

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, "test.etl_result");
    assert_eq!(writes[0].1.column_names(), vec!["user_id", "avg_amount"]);
    assert_eq!(writes[0].1.len(), 4);
}

#[tokio::test]
async fn test_degraded_relational_write_lands_in_output_dir() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let mut pipeline = steps(etl_steps(&fixture));
    pipeline.extend(steps(json!([{"op": "write_sink_relational", "table": "test.etl_result"}])));
    engine.submit(PipelineRequest::from_steps(pipeline)).await.unwrap();

    let written = std::fs::read_to_string(fixture.output_dir().join("test_etl_result.csv")).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], "user_id,avg_amount");
    assert_eq!(&lines[1..], &["1,15", "2,5", "3,", "4,7.5"]);
}

#[tokio::test]
async fn test_normalize_then_write_without_aggregate() {
    let fixture = Fixture::new();
    let sink = MockSink::new();
    let engine = engine_with(
        Sinks::local(fixture.output_dir()).with_columnar(sink.clone()),
        Arc::new(InMemoryRunStore::new()),
    );

    let response = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "normalize_text_fields", "input": "orders"},
            {"op": "write_sink_columnar", "table": "analytics.orders"}
        ]))))
        .await
        .unwrap();

    assert_eq!(response.preview.len(), 5);
    assert_eq!(response.preview[0]["name"], "Ann");

    let writes = sink.writes();
    assert_eq!(writes[0].0, "analytics.orders");
    assert_eq!(writes[0].1.rows()[0][1], Value::Text("Ann".into()));
}

#[tokio::test]
async fn test_intent_runs_canonical_plan() {
    let fixture = Fixture::new();
    let store = Arc::new(InMemoryRunStore::new());
    let resolver = RuleBasedResolver::default().with_sources(fixture.orders(), fixture.users());
    let interpreter = datapipe::Interpreter::new(
        datapipe::OperatorRegistry::with_defaults(),
        datapipe::operators::OperatorEnv::new(Sinks::local(fixture.output_dir())),
        datapipe::RunRecorder::new(store.clone()),
    );
    let engine = ExecutionEngine::new(interpreter, Arc::new(resolver));

    let response = engine
        .submit(PipelineRequest::from_intent("build an ETL with the average check per user"))
        .await
        .unwrap();

    let users: Vec<&serde_json::Value> = response.preview.iter().map(|r| &r["user_id"]).collect();
    assert_eq!(users, vec![&json!(1), &json!(2), &json!(3), &json!(4)]);
    assert_eq!(response.preview[0]["avg_check"], json!(15.0));
    assert!(fixture.output_dir().join("test_etl_result.csv").exists());
}

#[tokio::test]
async fn test_pipeline_file_with_output_spec() {
    let fixture = Fixture::new();
    let yaml = format!(
        r#"
name: nightly_orders
output:
  sink: relational
  table: reports.orders
steps:
  - op: read_tabular_csv
    name: orders
    path: "{}"
"#,
        fixture.orders()
    );
    let pipeline = PipelineConfig::from_yaml(&yaml).unwrap().to_pipeline();
    let (engine, store) = local_engine(&fixture);

    engine.submit(PipelineRequest::from_pipeline(&pipeline)).await.unwrap();

    assert!(fixture.output_dir().join("reports_orders.csv").exists());
    assert_eq!(store.recent(1).await.unwrap()[0].pipeline_label, "nightly_orders");
}

#[tokio::test]
async fn test_unreachable_sink_at_startup_falls_back_to_files() {
    let fixture = Fixture::new();
    let config = EngineConfig {
        sink_url: Some("sqlite:///nonexistent-dir/datapipe/sink.db".into()),
        output_dir: fixture.output_dir(),
        ..Default::default()
    };
    let engine = ExecutionEngine::from_config(&config, false).await;

    let mut pipeline = steps(etl_steps(&fixture));
    pipeline.extend(steps(json!([{"op": "write_sink_relational", "table": "test.etl_result"}])));
    engine.submit(PipelineRequest::from_steps(pipeline)).await.unwrap();

    assert!(fixture.output_dir().join("test_etl_result.csv").exists());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_sink_and_history() {
    let fixture = Fixture::new();
    let sink_db = fixture.path().join("sink.db");
    let runs_db = fixture.path().join("runs.db");
    let config = EngineConfig {
        sink_url: Some(format!("sqlite://{}?mode=rwc", sink_db.display())),
        database_url: Some(format!("sqlite://{}?mode=rwc", runs_db.display())),
        output_dir: fixture.output_dir(),
        ..Default::default()
    };
    let engine = ExecutionEngine::from_config(&config, true).await;

    let mut pipeline = steps(etl_steps(&fixture));
    pipeline.extend(steps(json!([{"op": "write_sink_relational", "table": "test.etl_result"}])));
    let response = engine
        .submit(PipelineRequest::from_steps(pipeline).with_label("in_memory_demo"))
        .await
        .unwrap();

    assert!(response.run_id.is_some());
    assert!(!fixture.output_dir().join("test_etl_result.csv").exists());

    let runs = engine.recent_runs(5).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].pipeline_label, "in_memory_demo");
    assert_eq!(runs[0].status, RunStatus::Success);
}
