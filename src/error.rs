//! Caller-facing error taxonomy

use crate::intent::IntentError;
use crate::operators::OperatorError;
use std::fmt;
use thiserror::Error;

/// Category of a failure, independent of where it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownOperation,
    InvalidParameters,
    UnresolvedReference,
    MissingJoinKey,
    MissingColumn,
    UnsupportedMetric,
    SourceIo,
    SinkIo,
    /// Only ever logged; the run recorder degrades instead of failing
    AuditStorageUnavailable,
    IntentResolution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownOperation => "UnknownOperation",
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::UnresolvedReference => "UnresolvedReference",
            ErrorKind::MissingJoinKey => "MissingJoinKey",
            ErrorKind::MissingColumn => "MissingColumn",
            ErrorKind::UnsupportedMetric => "UnsupportedMetric",
            ErrorKind::SourceIo => "SourceIOError",
            ErrorKind::SinkIo => "SinkIOError",
            ErrorKind::AuditStorageUnavailable => "AuditStorageUnavailable",
            ErrorKind::IntentResolution => "IntentResolution",
        };
        f.write_str(name)
    }
}

/// Terminal error of a pipeline submission
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step {index} ({op}) failed: {source}")]
    Step {
        index: usize,
        op: String,
        #[source]
        source: OperatorError,
    },

    #[error("intent resolution failed: {0}")]
    Intent(#[from] IntentError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Step { source, .. } => source.kind(),
            PipelineError::Intent(_) => ErrorKind::IntentResolution,
        }
    }

    /// Zero-based index of the failing step
    pub fn step_index(&self) -> Option<usize> {
        match self {
            PipelineError::Step { index, .. } => Some(*index),
            PipelineError::Intent(_) => None,
        }
    }

    pub fn op(&self) -> Option<&str> {
        match self {
            PipelineError::Step { op, .. } => Some(op),
            PipelineError::Intent(_) => None,
        }
    }
}
