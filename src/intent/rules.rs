//! Deterministic fallback resolver

use crate::core::{
    AggregateParams, JoinParams, NormalizeParams, Operation, PipelinePlan, ReadParams, StepSpec,
    WriteParams,
};
use crate::intent::{IntentError, IntentResolver};
use async_trait::async_trait;
use tracing::debug;

/// Inputs and output of the canonical ETL plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefaults {
    pub csv_path: String,
    pub json_path: String,
    pub join_key: String,
    pub amount_column: String,
    pub table: String,
    pub schedule: String,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            csv_path: "./data/input.csv".to_string(),
            json_path: "./data/input.json".to_string(),
            join_key: "user_id".to_string(),
            amount_column: "amount".to_string(),
            table: "test.etl_result".to_string(),
            schedule: "@daily".to_string(),
        }
    }
}

/// Resolves any non-empty intent to the canonical ETL plan: read a CSV and a
/// JSON source, trim the CSV text, left join on the key, average the amount
/// per key and write the result to the relational sink.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedResolver {
    defaults: RuleDefaults,
}

impl RuleBasedResolver {
    pub fn new(defaults: RuleDefaults) -> Self {
        Self { defaults }
    }

    pub fn with_sources(mut self, csv_path: impl Into<String>, json_path: impl Into<String>) -> Self {
        self.defaults.csv_path = csv_path.into();
        self.defaults.json_path = json_path.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.defaults.table = table.into();
        self
    }

    fn canonical_steps(&self) -> Vec<StepSpec> {
        let d = &self.defaults;
        vec![
            Operation::ReadTabularCsv(ReadParams {
                name: "csv".into(),
                path: d.csv_path.clone(),
            }),
            Operation::NormalizeTextFields(NormalizeParams { input: "csv".into() }),
            Operation::ReadTabularJson(ReadParams {
                name: "json".into(),
                path: d.json_path.clone(),
            }),
            Operation::Join(JoinParams {
                left: "csv".into(),
                right: "json".into(),
                on: d.join_key.clone(),
            }),
            Operation::Aggregate(AggregateParams {
                by: d.join_key.clone(),
                metric: "avg".into(),
                column: d.amount_column.clone(),
                alias: Some("avg_check".into()),
                source: None,
            }),
            Operation::WriteSinkRelational(WriteParams {
                table: d.table.clone(),
            }),
        ]
        .into_iter()
        .map(StepSpec::from)
        .collect()
    }
}

#[async_trait]
impl IntentResolver for RuleBasedResolver {
    async fn resolve(&self, text: &str) -> Result<PipelinePlan, IntentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IntentError::Empty);
        }
        debug!("Resolving intent with rules: {}", text);

        Ok(PipelinePlan {
            steps: self.canonical_steps(),
            schedule: Some(self.defaults.schedule.clone()),
        })
    }
}
