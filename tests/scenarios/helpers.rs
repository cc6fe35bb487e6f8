//! Shared fixtures, mock sinks and engine builders for scenario tests

use async_trait::async_trait;
use datapipe::core::{Dataset, RunStatus, StepSpec};
use datapipe::execution::{ExecutionEngine, Interpreter};
use datapipe::intent::RuleBasedResolver;
use datapipe::operators::{OperatorEnv, OperatorRegistry};
use datapipe::persistence::{AuditError, InMemoryRunStore, RunId, RunRecord, RunRecorder, RunStore};
use datapipe::sinks::{Sink, SinkError, Sinks, TableName, WriteReceipt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Orders with untrimmed names, a null amount and one user without a match
pub const ORDERS_CSV: &str = "user_id,name,amount\n1, Ann ,10\n1,Ann,20\n2,Bob,5\n3,Cid,\n4,Dan,7.5\n";

/// Users: user 2 appears twice, user 5 has no orders
pub const USERS_JSON: &str = r#"[
  {"user_id": 1, "city": "Oslo"},
  {"user_id": 2, "city": "Paris"},
  {"user_id": 2, "city": "Rome"},
  {"user_id": 5, "city": "Nowhere"}
]"#;

/// Temporary directory holding input files and sink output
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Write a file and return its path as a string
    pub fn write(&self, name: &str, contents: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path.to_string_lossy().into_owned()
    }

    pub fn orders(&self) -> String {
        self.write("orders.csv", ORDERS_CSV)
    }

    pub fn users(&self) -> String {
        self.write("users.json", USERS_JSON)
    }
}

/// Sink that keeps every write in memory
#[derive(Default)]
pub struct MockSink {
    writes: Mutex<Vec<(String, Dataset)>>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<(String, Dataset)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn write(&self, table: &TableName, dataset: &Dataset) -> Result<WriteReceipt, SinkError> {
        self.writes
            .lock()
            .unwrap()
            .push((table.to_string(), dataset.clone()));
        Ok(WriteReceipt {
            location: format!("mock:{}", table),
            rows: dataset.len(),
        })
    }
}

/// Sink whose writes always fail, like a database that went away
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn write(&self, _table: &TableName, _dataset: &Dataset) -> Result<WriteReceipt, SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }
}

/// In-memory run store that counts terminal transitions
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryRunStore,
    closes: AtomicUsize,
}

impl CountingStore {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunStore for CountingStore {
    async fn open(&self, pipeline_label: &str) -> Result<RunId, AuditError> {
        self.inner.open(pipeline_label).await
    }

    async fn close(&self, id: RunId, status: RunStatus) -> Result<(), AuditError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close(id, status).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, AuditError> {
        self.inner.recent(limit).await
    }

    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, AuditError> {
        self.inner.get(id).await
    }
}

/// Engine over the given sinks, recording into `store`
pub fn engine_with(sinks: Sinks, store: Arc<dyn RunStore>) -> ExecutionEngine {
    let interpreter = Interpreter::new(
        OperatorRegistry::with_defaults(),
        OperatorEnv::new(sinks),
        RunRecorder::new(store),
    );
    ExecutionEngine::new(interpreter, Arc::new(RuleBasedResolver::default()))
}

/// Engine writing to local files under the fixture, with an in-memory run store
pub fn local_engine(fixture: &Fixture) -> (ExecutionEngine, Arc<InMemoryRunStore>) {
    let store = Arc::new(InMemoryRunStore::new());
    let engine = engine_with(Sinks::local(fixture.output_dir()), store.clone());
    (engine, store)
}

pub fn steps(value: serde_json::Value) -> Vec<StepSpec> {
    serde_json::from_value(value).expect("valid step list")
}

/// Preview rows as sorted JSON strings, for order-insensitive comparison
pub fn sorted_rows<R: serde::Serialize>(rows: &[R]) -> Vec<String> {
    let mut out: Vec<String> = rows
        .iter()
        .map(|r| serde_json::to_string(r).expect("serializable row"))
        .collect();
    out.sort();
    out
}
