//! Step domain model
//!
//! A step travels as a loose JSON object (`{"op": "...", ...}`) and is parsed
//! into a typed [`Operation`] only when the interpreter reaches it. Generated
//! step lists can therefore fail at the exact step that is wrong.

use crate::core::context::{JOINED, RESULT};
use crate::operators::OperatorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed catalog of operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ReadTabularCsv,
    ReadTabularJson,
    NormalizeTextFields,
    Join,
    Aggregate,
    WriteSinkRelational,
    WriteSinkColumnar,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::ReadTabularCsv,
        OperationKind::ReadTabularJson,
        OperationKind::NormalizeTextFields,
        OperationKind::Join,
        OperationKind::Aggregate,
        OperationKind::WriteSinkRelational,
        OperationKind::WriteSinkColumnar,
    ];

    /// Wire name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ReadTabularCsv => "read_tabular_csv",
            OperationKind::ReadTabularJson => "read_tabular_json",
            OperationKind::NormalizeTextFields => "normalize_text_fields",
            OperationKind::Join => "join",
            OperationKind::Aggregate => "aggregate",
            OperationKind::WriteSinkRelational => "write_sink_relational",
            OperationKind::WriteSinkColumnar => "write_sink_columnar",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation metrics understood by the aggregate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Avg,
}

impl Metric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Metric::Avg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadParams {
    /// Dataset name to register
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeParams {
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinParams {
    pub left: String,
    pub right: String,
    pub on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateParams {
    pub by: String,
    pub metric: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Dataset to group; defaults to `joined`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl AggregateParams {
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(JOINED)
    }

    pub fn output_column(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.metric, self.column))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteParams {
    /// Qualified table name, e.g. `analytics.daily_totals`
    pub table: String,
}

/// A typed operation with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    ReadTabularCsv(ReadParams),
    ReadTabularJson(ReadParams),
    NormalizeTextFields(NormalizeParams),
    Join(JoinParams),
    Aggregate(AggregateParams),
    WriteSinkRelational(WriteParams),
    WriteSinkColumnar(WriteParams),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ReadTabularCsv(_) => OperationKind::ReadTabularCsv,
            Operation::ReadTabularJson(_) => OperationKind::ReadTabularJson,
            Operation::NormalizeTextFields(_) => OperationKind::NormalizeTextFields,
            Operation::Join(_) => OperationKind::Join,
            Operation::Aggregate(_) => OperationKind::Aggregate,
            Operation::WriteSinkRelational(_) => OperationKind::WriteSinkRelational,
            Operation::WriteSinkColumnar(_) => OperationKind::WriteSinkColumnar,
        }
    }

    /// Dataset names this operation reads by name
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Operation::ReadTabularCsv(_) | Operation::ReadTabularJson(_) => vec![],
            Operation::NormalizeTextFields(p) => vec![p.input.as_str()],
            Operation::Join(p) => vec![p.left.as_str(), p.right.as_str()],
            Operation::Aggregate(p) => vec![p.source_name()],
            Operation::WriteSinkRelational(_) | Operation::WriteSinkColumnar(_) => vec![],
        }
    }

    /// Dataset names this operation adds or overwrites
    pub fn outputs(&self) -> Vec<&str> {
        match self {
            Operation::ReadTabularCsv(p) | Operation::ReadTabularJson(p) => vec![p.name.as_str()],
            Operation::NormalizeTextFields(p) => vec![p.input.as_str()],
            Operation::Join(_) => vec![JOINED],
            Operation::Aggregate(_) => vec![RESULT],
            Operation::WriteSinkRelational(_) | Operation::WriteSinkColumnar(_) => vec![],
        }
    }

    /// Whether the operation consumes the context's output dataset
    pub fn reads_output(&self) -> bool {
        matches!(
            self,
            Operation::WriteSinkRelational(_) | Operation::WriteSinkColumnar(_)
        )
    }

    pub fn to_spec(&self) -> StepSpec {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => StepSpec(map),
            _ => StepSpec::named(self.kind().as_str()),
        }
    }
}

/// A step as it arrives from a pipeline file or the intent resolver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepSpec(serde_json::Map<String, serde_json::Value>);

impl StepSpec {
    /// A step with only an `op` field
    pub fn named(op: &str) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("op".to_string(), serde_json::Value::String(op.to_string()));
        Self(map)
    }

    /// Add a field
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// The raw `op` field, or an empty string when absent
    pub fn op_name(&self) -> &str {
        self.0.get("op").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    /// Resolve the operation kind, failing with `UnknownOperation`
    pub fn kind(&self) -> Result<OperationKind, OperatorError> {
        let name = self.op_name();
        OperationKind::from_name(name)
            .ok_or_else(|| OperatorError::UnknownOperation(name.to_string()))
    }

    /// Parse into a typed operation
    pub fn parse(&self) -> Result<Operation, OperatorError> {
        let kind = self.kind()?;
        serde_json::from_value(serde_json::Value::Object(self.0.clone())).map_err(|e| {
            OperatorError::InvalidParameters {
                op: kind.as_str().to_string(),
                reason: e.to_string(),
            }
        })
    }
}

impl From<Operation> for StepSpec {
    fn from(op: Operation) -> Self {
        op.to_spec()
    }
}
