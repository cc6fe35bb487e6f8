//! Test: daily triggers submit through the engine and stay independent

use crate::helpers::*;
use chrono::{DateTime, Local, TimeZone};
use datapipe::core::RunStatus;
use datapipe::execution::{Clock, CronSpec, PipelineTemplate, ScheduleError, Scheduler};
use datapipe::persistence::RunStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Read `path` as "data" and average its amounts per user
fn template(path: String) -> PipelineTemplate {
    PipelineTemplate::Steps(steps(json!([
        {"op": "read_tabular_csv", "name": "data", "path": path},
        {"op": "aggregate", "by": "user_id", "metric": "avg", "column": "amount", "source": "data"}
    ])))
}

/// Local time that moves with tokio's (pausable) clock
struct TokioClock {
    origin: DateTime<Local>,
    start: tokio::time::Instant,
}

impl TokioClock {
    /// Starts at 01:00 local time on a day without DST changes
    fn at_one_am() -> Arc<Self> {
        Arc::new(Self {
            origin: Local.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap(),
            start: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Local> {
        self.origin + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

async fn wait_for_runs(store: &datapipe::persistence::InMemoryRunStore, count: usize) {
    for _ in 0..200 {
        let runs = store.recent(10).await.unwrap();
        if runs.len() >= count && runs.iter().all(|r| r.status != RunStatus::Running) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} finished runs", count);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_fires_at_its_time() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);
    let scheduler = Scheduler::with_clock(Arc::new(engine), TokioClock::at_one_am());
    let data = fixture.write("nightly.csv", "user_id,amount\n1,10\n1,30\n");

    scheduler
        .register(CronSpec::new(2, 0).unwrap(), template(data))
        .await;

    tokio::time::sleep(Duration::from_secs(59 * 60)).await;
    assert!(store.recent(10).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    wait_for_runs(&store, 1).await;

    let runs = store.recent(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].pipeline_label, "scheduled");

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_pending_fires() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);
    let scheduler = Scheduler::with_clock(Arc::new(engine), TokioClock::at_one_am());
    let data = fixture.write("nightly.csv", "user_id,amount\n1,10\n");

    scheduler
        .register(CronSpec::new(1, 30).unwrap(), template(data.clone()))
        .await;
    scheduler.shutdown().await;

    tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
    assert!(store.recent(10).await.unwrap().is_empty());

    // registering again restarts the scheduler
    let id = scheduler
        .register(CronSpec::new(1, 30).unwrap(), template(data))
        .await;
    assert!(scheduler.is_running());
    assert!(scheduler.fire_now(id).await.is_ok());
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_fires_are_isolated() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);
    let scheduler = Scheduler::new(Arc::new(engine));

    let first = fixture.write("first.csv", "user_id,amount\n1,10\n1,30\n");
    let second = fixture.write("second.csv", "user_id,amount\n7,2\n8,4\n8,8\n");

    let a = scheduler
        .register(CronSpec::parse("0 2 * * *").unwrap(), template(first))
        .await;
    let b = scheduler
        .register_labeled(CronSpec::parse("30 3 * * *").unwrap(), template(second), "second")
        .await;
    assert_ne!(a, b);

    let (ra, rb) = tokio::join!(scheduler.fire_now(a), scheduler.fire_now(b));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_ne!(ra.run_id, rb.run_id);
    assert_eq!(ra.preview.len(), 1);
    assert_eq!(ra.preview[0]["user_id"], json!(1));
    assert_eq!(ra.preview[0]["avg_amount"], json!(20.0));
    assert_eq!(rb.preview.len(), 2);
    assert_eq!(rb.preview[1]["user_id"], json!(8));
    assert_eq!(rb.preview[1]["avg_amount"], json!(6.0));

    let runs = store.recent(10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    let mut labels: Vec<&str> = runs.iter().map(|r| r.pipeline_label.as_str()).collect();
    labels.sort();
    assert_eq!(labels, vec!["scheduled", "second"]);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_failed_fire_does_not_affect_other_triggers() {
    let fixture = Fixture::new();
    let (engine, store) = local_engine(&fixture);
    let scheduler = Scheduler::new(Arc::new(engine));

    let missing = fixture.path().join("gone.csv").to_string_lossy().into_owned();
    let good = fixture.write("good.csv", "user_id,amount\n1,4\n");
    let broken = scheduler.register(CronSpec::new(1, 0).unwrap(), template(missing)).await;
    let healthy = scheduler.register(CronSpec::new(1, 0).unwrap(), template(good)).await;

    let err = scheduler.fire_now(broken).await.unwrap_err();
    assert!(matches!(err, ScheduleError::Pipeline(_)));

    let response = scheduler.fire_now(healthy).await.unwrap();
    assert_eq!(response.status, "ok");
    assert_eq!(scheduler.triggers().await.len(), 2);

    let statuses: Vec<RunStatus> = store.recent(10).await.unwrap().iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![RunStatus::Success, RunStatus::Failed]);
}

#[tokio::test]
async fn test_intent_trigger_runs_canonical_plan() {
    let fixture = Fixture::new();
    let store = Arc::new(datapipe::persistence::InMemoryRunStore::new());
    let interpreter = datapipe::Interpreter::new(
        datapipe::OperatorRegistry::with_defaults(),
        datapipe::operators::OperatorEnv::new(datapipe::sinks::Sinks::local(fixture.output_dir())),
        datapipe::RunRecorder::new(store.clone()),
    );
    let resolver = datapipe::RuleBasedResolver::default().with_sources(fixture.orders(), fixture.users());
    let engine = datapipe::ExecutionEngine::new(interpreter, Arc::new(resolver));
    let scheduler = Scheduler::new(Arc::new(engine));

    let id = scheduler
        .schedule_daily("build an ETL with the average check per user", 2, 0)
        .await
        .unwrap();
    let response = scheduler.fire_now(id).await.unwrap();

    assert_eq!(response.preview.len(), 4);
    assert_eq!(store.recent(1).await.unwrap()[0].pipeline_label, "scheduled");
    assert!(fixture.output_dir().join("test_etl_result.csv").exists());
}

#[tokio::test]
async fn test_invalid_daily_time_is_rejected() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let scheduler = Scheduler::new(Arc::new(engine));

    assert!(matches!(
        scheduler.schedule_daily("nightly", 24, 0).await,
        Err(ScheduleError::InvalidCronSpec(_))
    ));
    assert!(matches!(
        scheduler.schedule_daily("nightly", 2, 60).await,
        Err(ScheduleError::InvalidCronSpec(_))
    ));
    assert!(scheduler.triggers().await.is_empty());
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_remove_and_shutdown() {
    let fixture = Fixture::new();
    let (engine, _) = local_engine(&fixture);
    let scheduler = Scheduler::new(Arc::new(engine));

    let early = scheduler
        .register(CronSpec::new(1, 0).unwrap(), PipelineTemplate::Intent("etl".into()))
        .await;
    let late = scheduler
        .register(CronSpec::new(23, 0).unwrap(), PipelineTemplate::Intent("etl".into()))
        .await;
    assert!(scheduler.is_running());

    let listed: Vec<_> = scheduler.triggers().await.into_iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![early, late]);

    assert!(scheduler.remove(early).await);
    assert!(!scheduler.remove(early).await);
    assert!(matches!(
        scheduler.fire_now(early).await,
        Err(ScheduleError::UnknownTrigger(id)) if id == early
    ));

    scheduler.shutdown().await;
    assert!(scheduler.triggers().await.is_empty());
    assert!(!scheduler.is_running());
    assert!(matches!(
        scheduler.fire_now(late).await,
        Err(ScheduleError::UnknownTrigger(_))
    ));
}
