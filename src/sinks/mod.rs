//! Output sinks
//!
//! Pipelines write their final dataset to a relational store, a columnar
//! analytical store, or, when no relational store is reachable, to a local
//! CSV file.

pub mod columnar;
pub mod local;
#[cfg(feature = "sqlite")]
pub mod relational;

use crate::core::config::EngineConfig;
use crate::core::Dataset;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{info, warn};

pub use columnar::ClickHouseSink;
pub use local::LocalFileSink;
#[cfg(feature = "sqlite")]
pub use relational::SqliteSink;

/// Errors raised by sink writes
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{0} sink is not configured")]
    NotConfigured(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A validated `[schema.]table` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

fn identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.iter().any(|p| !identifier().is_match(p)) {
            return Err(format!("'{}' is not a valid table identifier", raw));
        }
        match parts.as_slice() {
            [name] => Ok(Self {
                schema: None,
                name: name.to_string(),
            }),
            [schema, name] => Ok(Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            }),
            _ => Err(format!("'{}' has more than one schema qualifier", raw)),
        }
    }

    /// Single identifier with the schema folded in: `schema_table`
    pub fn flattened(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}_{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Where a write landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub location: String,
    pub rows: usize,
}

/// A destination for pipeline output
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Write the dataset, creating the target table if absent
    async fn write(&self, table: &TableName, dataset: &Dataset) -> Result<WriteReceipt, SinkError>;
}

/// The sinks available to a run
#[derive(Clone)]
pub struct Sinks {
    pub relational: Option<Arc<dyn Sink>>,
    pub columnar: Option<Arc<dyn Sink>>,
    /// Used for relational writes when no relational sink is available
    pub fallback: Arc<dyn Sink>,
}

impl Sinks {
    /// Degraded setup: only local files
    pub fn local(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            relational: None,
            columnar: None,
            fallback: Arc::new(LocalFileSink::new(output_dir)),
        }
    }

    pub fn with_relational(mut self, sink: Arc<dyn Sink>) -> Self {
        self.relational = Some(sink);
        self
    }

    pub fn with_columnar(mut self, sink: Arc<dyn Sink>) -> Self {
        self.columnar = Some(sink);
        self
    }

    /// Build sinks from configuration.
    ///
    /// A relational sink that cannot be reached here is dropped and relational
    /// writes fall back to local files.
    pub async fn from_config(config: &EngineConfig) -> Self {
        let mut sinks = Sinks::local(config.output_dir.clone());

        #[cfg(feature = "sqlite")]
        if let Some(url) = &config.sink_url {
            match SqliteSink::connect(url, config.max_connections).await {
                Ok(sink) => {
                    info!("Relational sink connected: {}", url);
                    sinks = sinks.with_relational(Arc::new(sink));
                }
                Err(e) => {
                    warn!(
                        "Relational sink unreachable ({}), writing to {} instead",
                        e,
                        config.output_dir.display()
                    );
                }
            }
        }

        #[cfg(not(feature = "sqlite"))]
        if config.sink_url.is_some() {
            warn!("Built without sqlite support, relational writes go to local files");
        }

        if let Some(url) = &config.columnar_url {
            info!("Columnar sink endpoint: {}", url);
            sinks = sinks.with_columnar(Arc::new(ClickHouseSink::new(url)));
        }

        sinks
    }
}
