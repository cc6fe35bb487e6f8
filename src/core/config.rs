//! Pipeline files and engine configuration

use crate::core::pipeline::{OutputSpec, Pipeline};
use crate::core::step::StepSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pipeline definition loaded from YAML (or JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, recorded as the run label
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Cron-like schedule expression
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default)]
    pub output: Option<OutputSpec>,

    /// Ordered steps; operation names are checked when the step runs
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation only; step semantics are left to execution
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.op_name().is_empty() {
                anyhow::bail!("Step {} has no 'op' field", index);
            }
        }

        Ok(())
    }

    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline {
            name: self.name.clone(),
            steps: self.steps.clone(),
            schedule: self.schedule.clone(),
            output: self.output.clone(),
        }
    }
}

/// Engine settings: audit store, sinks and output handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Audit database URL; the default lives under the local data dir
    pub database_url: Option<String>,

    /// Relational sink URL; without one, relational writes go to local files
    pub sink_url: Option<String>,

    /// Columnar sink HTTP endpoint, e.g. `http://localhost:8123`
    pub columnar_url: Option<String>,

    /// Directory for local sink files
    pub output_dir: PathBuf,

    /// Rows returned in a run preview
    pub preview_rows: usize,

    /// Audit connection pool size
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            sink_url: None,
            columnar_url: None,
            output_dir: PathBuf::from("./data"),
            preview_rows: 10,
            max_connections: 5,
        }
    }
}

impl EngineConfig {
    /// Load from an optional YAML file, then apply `DATAPIPE_*` environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Invalid config file {}", path))?
            }
            None => EngineConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATAPIPE_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = lookup("DATAPIPE_SINK_URL") {
            self.sink_url = Some(url);
        }
        if let Some(url) = lookup("DATAPIPE_COLUMNAR_URL") {
            self.columnar_url = Some(url);
        }
        if let Some(dir) = lookup("DATAPIPE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Audit database URL, falling back to `<data_local_dir>/datapipe/runs.db`
    pub fn audit_database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }

        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        let db_dir = data_dir.join("datapipe");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Ok(format!("sqlite://{}?mode=rwc", db_dir.join("runs.db").display()))
    }
}
