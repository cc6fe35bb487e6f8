//! Test: failures stop the run, carry their location and mark the record failed

use crate::helpers::*;
use datapipe::core::{PipelineRequest, RunStatus};
use datapipe::error::ErrorKind;
use datapipe::execution::ExecutionEvent;
use datapipe::operators::OperatorError;
use datapipe::persistence::{InMemoryRunStore, RunStore};
use datapipe::sinks::Sinks;
use datapipe::PipelineError;
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_unreachable_sink_fails_run_once() {
    let fixture = Fixture::new();
    let store = Arc::new(CountingStore::default());
    let engine = engine_with(
        Sinks::local(fixture.output_dir()).with_relational(Arc::new(FailingSink)),
        store.clone(),
    );

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "write_sink_relational", "table": "test.etl_result"}
        ]))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SinkIo);
    assert_eq!(err.step_index(), Some(1));
    assert_eq!(store.closes(), 1);

    let runs = store.recent(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].finished_at.is_some());

    // a configured sink that fails is not silently replaced by the file fallback
    assert!(!fixture.output_dir().join("test_etl_result.csv").exists());
}

#[tokio::test]
async fn test_unknown_operation_reports_index_and_stops() {
    let fixture = Fixture::new();
    let sink = MockSink::new();
    let store = Arc::new(InMemoryRunStore::new());
    let engine = engine_with(
        Sinks::local(fixture.output_dir()).with_relational(sink.clone()),
        store.clone(),
    );
    let started = Arc::new(Mutex::new(Vec::new()));
    let seen = started.clone();
    engine
        .add_event_handler(move |event| {
            if let ExecutionEvent::StepStarted { index, .. } = event {
                seen.lock().unwrap().push(index);
            }
        })
        .await;

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "pivot", "by": "user_id"},
            {"op": "write_sink_relational", "table": "never.written"}
        ]))))
        .await
        .unwrap_err();

    match &err {
        PipelineError::Step { index, op, source } => {
            assert_eq!(*index, 1);
            assert_eq!(op, "pivot");
            assert!(matches!(source, OperatorError::UnknownOperation(name) if name == "pivot"));
        }
        other => panic!("expected a step error, got {:?}", other),
    }
    assert_eq!(*started.lock().unwrap(), vec![0, 1]);
    assert!(sink.writes().is_empty());
    assert_eq!(store.recent(1).await.unwrap()[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_missing_op_field_is_unknown_operation() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([{"name": "orders"}]))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownOperation);
    assert_eq!(err.step_index(), Some(0));
}

#[tokio::test]
async fn test_unregistered_name_is_unresolved() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "normalize_text_fields", "input": "customers"}
        ]))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    assert_eq!(err.step_index(), Some(1));
    assert_eq!(store.recent(1).await.unwrap()[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn test_aggregate_without_join_is_unresolved() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount"}
        ]))))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Step {
            source: OperatorError::UnresolvedReference(ref name),
            ..
        } if name == "joined"
    ));
}

#[tokio::test]
async fn test_missing_join_key() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let cities = fixture.write("cities.json", r#"[{"city": "Oslo"}]"#);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "read_tabular_json", "name": "cities", "path": cities},
            {"op": "join", "left": "orders", "right": "cities", "on": "user_id"}
        ]))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingJoinKey);
    assert_eq!(err.step_index(), Some(2));
}

#[tokio::test]
async fn test_unsupported_metric() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "read_tabular_json", "name": "users", "path": fixture.users()},
            {"op": "join", "left": "orders", "right": "users", "on": "user_id"},
            {"op": "aggregate", "by": "user_id", "metric": "median", "column": "amount"}
        ]))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedMetric);
}

#[tokio::test]
async fn test_missing_source_file() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let missing = fixture.path().join("missing.csv");

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": missing.to_string_lossy()}
        ]))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceIo);
}

#[tokio::test]
async fn test_columnar_write_without_sink() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);

    let err = engine
        .submit(PipelineRequest::from_steps(steps(json!([
            {"op": "read_tabular_csv", "name": "orders", "path": fixture.orders()},
            {"op": "write_sink_columnar", "table": "default.etl_result"}
        ]))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SinkIo);
}

#[tokio::test]
async fn test_degraded_history_keeps_original_error() {
    let fixture = Fixture::new();
    let interpreter = datapipe::Interpreter::new(
        datapipe::OperatorRegistry::with_defaults(),
        datapipe::operators::OperatorEnv::new(Sinks::local(fixture.output_dir())),
        datapipe::RunRecorder::degraded(),
    );

    let err = interpreter
        .execute("degraded", &steps(json!([{"op": "join", "left": "a", "right": "b", "on": "k"}])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
}
