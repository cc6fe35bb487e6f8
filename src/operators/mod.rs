//! Operator catalog
//!
//! Every operation kind maps to one [`Operator`] through the
//! [`OperatorRegistry`]. Operators validate their own inputs against the
//! run's [`ExecutionContext`] and report failures as [`OperatorError`].

pub mod aggregate;
pub mod join;
pub mod normalize;
pub mod read;
pub mod write;

use crate::core::{ExecutionContext, Operation, OperationKind};
use crate::error::ErrorKind;
use crate::sinks::{SinkError, Sinks};
use async_trait::async_trait;
use polars::prelude::PolarsError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use aggregate::Aggregate;
pub use join::Join;
pub use normalize::NormalizeTextFields;
pub use read::{ReadCsv, ReadJson};
pub use write::{WriteColumnar, WriteRelational};

/// Which side of a join is missing the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinSide::Left => f.write_str("left"),
            JoinSide::Right => f.write_str("right"),
        }
    }
}

/// Errors raised while parsing or running a single step
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid parameters for {op}: {reason}")]
    InvalidParameters { op: String, reason: String },

    #[error("dataset '{0}' is not produced by any earlier step")]
    UnresolvedReference(String),

    #[error("join key '{key}' is missing from {side} dataset '{dataset}'")]
    MissingJoinKey {
        key: String,
        side: JoinSide,
        dataset: String,
    },

    #[error("column '{column}' is missing from dataset '{dataset}'")]
    MissingColumn { column: String, dataset: String },

    #[error("unsupported metric '{0}'")]
    UnsupportedMetric(String),

    #[error("failed to read {path}: {reason}")]
    SourceIo { path: String, reason: String },

    #[error("failed to write table '{table}': {source}")]
    SinkIo {
        table: String,
        #[source]
        source: SinkError,
    },

    #[error("{op} failed on its input frame: {source}")]
    Frame {
        op: String,
        #[source]
        source: PolarsError,
    },
}

impl OperatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperatorError::UnknownOperation(_) => ErrorKind::UnknownOperation,
            OperatorError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            OperatorError::UnresolvedReference(_) => ErrorKind::UnresolvedReference,
            OperatorError::MissingJoinKey { .. } => ErrorKind::MissingJoinKey,
            OperatorError::MissingColumn { .. } => ErrorKind::MissingColumn,
            OperatorError::UnsupportedMetric(_) => ErrorKind::UnsupportedMetric,
            OperatorError::SourceIo { .. } => ErrorKind::SourceIo,
            OperatorError::SinkIo { .. } => ErrorKind::SinkIo,
            OperatorError::Frame { .. } => ErrorKind::InvalidParameters,
        }
    }

    pub(crate) fn frame(op: OperationKind, source: PolarsError) -> Self {
        OperatorError::Frame {
            op: op.to_string(),
            source,
        }
    }

    /// Error for an operation handed to the wrong operator
    pub(crate) fn mismatch(expected: OperationKind, got: &Operation) -> Self {
        OperatorError::InvalidParameters {
            op: got.kind().to_string(),
            reason: format!("dispatched to the {} operator", expected),
        }
    }
}

/// Shared services available to operators
#[derive(Clone)]
pub struct OperatorEnv {
    pub sinks: Sinks,
}

impl OperatorEnv {
    pub fn new(sinks: Sinks) -> Self {
        Self { sinks }
    }
}

/// One executable operation
#[async_trait]
pub trait Operator: Send + Sync {
    /// The operation kind this operator implements
    fn kind(&self) -> OperationKind;

    /// Apply the operation to the context
    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        env: &OperatorEnv,
    ) -> Result<(), OperatorError>;
}

/// Table mapping operation kinds to their operators
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: HashMap<OperationKind, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in catalog
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadCsv));
        registry.register(Arc::new(ReadJson));
        registry.register(Arc::new(NormalizeTextFields));
        registry.register(Arc::new(Join));
        registry.register(Arc::new(Aggregate));
        registry.register(Arc::new(WriteRelational));
        registry.register(Arc::new(WriteColumnar));
        registry
    }

    /// Register or replace the operator for its kind
    pub fn register(&mut self, operator: Arc<dyn Operator>) {
        self.operators.insert(operator.kind(), operator);
    }

    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn Operator>> {
        self.operators.get(&kind).cloned()
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.operators.contains_key(&kind)
    }
}
