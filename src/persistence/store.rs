//! SQLite-based run store

use crate::core::RunStatus;
use crate::persistence::{AuditError, RunId, RunRecord, RunStore};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Connect with a bounded pool and create the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AuditError> {
        if let Some(path) = url
            .strip_prefix("sqlite://")
            .map(|rest| rest.split('?').next().unwrap_or(rest))
        {
            if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .map_err(|e| AuditError::Unavailable(format!("{}: {}", dir.display(), e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pipeline TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                finished_at TEXT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_runs_pipeline ON runs(pipeline);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn record(row: &SqliteRow) -> Result<RunRecord, AuditError> {
        let status: String = row.try_get("status")?;
        Ok(RunRecord {
            id: row.try_get("id")?,
            pipeline_label: row.try_get("pipeline")?,
            status: status.parse().map_err(AuditError::Unavailable)?,
            started_at: Self::from_naive(row.try_get("started_at")?),
            finished_at: row
                .try_get::<Option<NaiveDateTime>, _>("finished_at")?
                .map(Self::from_naive),
        })
    }
}

#[async_trait::async_trait]
impl RunStore for SqliteRunStore {
    async fn open(&self, pipeline_label: &str) -> Result<RunId, AuditError> {
        let result = sqlx::query("INSERT INTO runs (pipeline, status) VALUES (?1, ?2)")
            .bind(pipeline_label)
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn close(&self, id: RunId, status: RunStatus) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            UPDATE runs
            SET status = ?1, finished_at = CURRENT_TIMESTAMP
            WHERE id = ?2 AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, AuditError> {
        let rows = sqlx::query(
            r#"
            SELECT id, pipeline, status, started_at, finished_at
            FROM runs
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::record).collect()
    }

    async fn get(&self, id: RunId) -> Result<Option<RunRecord>, AuditError> {
        let row = sqlx::query(
            "SELECT id, pipeline, status, started_at, finished_at FROM runs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record).transpose()
    }
}
