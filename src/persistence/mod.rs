//! Run history persistence
//!
//! Every pipeline invocation opens a run record in state `running` and closes
//! it once as `success` or `failed`. Storage is best-effort: the
//! [`RunRecorder`] swallows store failures and reports [`Recorded::Degraded`]
//! so a missing or broken database never changes a pipeline's outcome.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::RunStatus;
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Opaque auto-increment run identifier
pub type RunId = i64;

/// One row of run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub pipeline_label: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::AuditStorageUnavailable
    }
}

/// Durable storage for run records
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new `running` record
    async fn open(&self, pipeline_label: &str) -> Result<RunId, AuditError>;

    /// Move a `running` record to a terminal status.
    ///
    /// Records that are already terminal or do not exist are left alone.
    async fn close(&self, id: RunId, status: RunStatus) -> Result<(), AuditError>;

    /// Most recent records first
    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, AuditError>;

    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, AuditError>;
}

/// In-memory store (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<BTreeMap<RunId, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RunStore for InMemoryRunStore {
    async fn open(&self, pipeline_label: &str) -> Result<RunId, AuditError> {
        let mut runs = self.runs.write().await;
        let id = runs.keys().next_back().map_or(1, |last| last + 1);
        runs.insert(
            id,
            RunRecord {
                id,
                pipeline_label: pipeline_label.to_string(),
                status: RunStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn close(&self, id: RunId, status: RunStatus) -> Result<(), AuditError> {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(&id) {
            if run.status == RunStatus::Running {
                run.status = status;
                run.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, AuditError> {
        let runs = self.runs.read().await;
        Ok(runs.values().rev().take(limit).cloned().collect())
    }

    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, AuditError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }
}

/// Result of a best-effort audit call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded<T> {
    Stored(T),
    /// No store, or the store call failed
    Degraded,
}

impl<T> Recorded<T> {
    pub fn stored(self) -> Option<T> {
        match self {
            Recorded::Stored(value) => Some(value),
            Recorded::Degraded => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Recorded::Degraded)
    }
}

/// Best-effort front for a [`RunStore`]
#[derive(Clone, Default)]
pub struct RunRecorder {
    store: Option<Arc<dyn RunStore>>,
}

impl RunRecorder {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A recorder with no durable store
    pub fn degraded() -> Self {
        Self { store: None }
    }

    pub fn is_degraded(&self) -> bool {
        self.store.is_none()
    }

    pub async fn open(&self, pipeline_label: &str) -> Recorded<RunId> {
        let Some(store) = &self.store else {
            debug!("No run store, run '{}' is not recorded", pipeline_label);
            return Recorded::Degraded;
        };
        match store.open(pipeline_label).await {
            Ok(id) => Recorded::Stored(id),
            Err(e) => {
                warn!("Could not open run record for '{}': {}", pipeline_label, e);
                Recorded::Degraded
            }
        }
    }

    pub async fn close(&self, run: Recorded<RunId>, status: RunStatus) -> Recorded<()> {
        let (Some(store), Recorded::Stored(id)) = (&self.store, run) else {
            return Recorded::Degraded;
        };
        match store.close(id, status).await {
            Ok(()) => Recorded::Stored(()),
            Err(e) => {
                warn!("Could not mark run {} as {}: {}", id, status, e);
                Recorded::Degraded
            }
        }
    }

    /// Most recent runs first; empty when degraded
    pub async fn recent(&self, limit: usize) -> Vec<RunRecord> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.recent(limit).await.unwrap_or_else(|e| {
            warn!("Could not read run history: {}", e);
            Vec::new()
        })
    }

    pub async fn get(&self, id: RunId) -> Option<RunRecord> {
        let store = self.store.as_ref()?;
        store.get(id).await.unwrap_or_else(|e| {
            warn!("Could not read run {}: {}", id, e);
            None
        })
    }
}
