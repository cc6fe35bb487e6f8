//! datapipe - an in-memory tabular pipeline engine with run history and daily triggers

pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod intent;
pub mod operators;
pub mod persistence;
pub mod sinks;

// Re-export commonly used types
pub use crate::core::{Dataset, Operation, OperationKind, Pipeline, PipelineRequest, StepSpec, Value};
pub use error::{ErrorKind, PipelineError};
pub use execution::{ExecutionEngine, ExecutionEvent, Interpreter, PipelineResponse, Scheduler};
pub use intent::{IntentResolver, RuleBasedResolver};
pub use operators::{OperatorError, OperatorRegistry};
pub use persistence::{Recorded, RunRecord, RunRecorder};
