//! Pipeline domain model

use crate::core::step::{Operation, StepSpec, WriteParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Label used for runs submitted without one
pub const DEFAULT_LABEL: &str = "adhoc";

/// Where a pipeline's final dataset should land when no write step is given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sink", rename_all = "snake_case")]
pub enum OutputSpec {
    Relational { table: String },
    Columnar { table: String },
}

impl OutputSpec {
    pub fn to_operation(&self) -> Operation {
        match self {
            OutputSpec::Relational { table } => {
                Operation::WriteSinkRelational(WriteParams { table: table.clone() })
            }
            OutputSpec::Columnar { table } => {
                Operation::WriteSinkColumnar(WriteParams { table: table.clone() })
            }
        }
    }
}

/// An ordered list of steps plus optional schedule and output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,

    #[serde(default)]
    pub steps: Vec<StepSpec>,

    /// Cron-like schedule expression, e.g. `@daily` or `30 6 * * *`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            steps,
            schedule: None,
            output: None,
        }
    }

    /// Steps to execute, with the output sink appended when no step writes
    pub fn effective_steps(&self) -> Vec<StepSpec> {
        effective_steps(&self.steps, self.output.as_ref())
    }

    /// Static reference check.
    ///
    /// Reports unknown operations, bad parameters and names that are read
    /// before an earlier step produced them. Execution does not rely on this.
    pub fn check(&self) -> Vec<Diagnostic> {
        check_steps(&self.effective_steps())
    }
}

fn effective_steps(steps: &[StepSpec], output: Option<&OutputSpec>) -> Vec<StepSpec> {
    let mut steps = steps.to_vec();
    if let Some(output) = output {
        let has_writer = steps.iter().any(|s| s.op_name().starts_with("write_sink_"));
        if !has_writer {
            steps.push(output.to_operation().to_spec());
        }
    }
    steps
}

/// A problem found by [`Pipeline::check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub index: usize,
    pub op: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}): {}", self.index, self.op, self.message)
    }
}

pub fn check_steps(steps: &[StepSpec]) -> Vec<Diagnostic> {
    let mut produced: HashSet<String> = HashSet::new();
    let mut diagnostics = Vec::new();

    for (index, spec) in steps.iter().enumerate() {
        let op = match spec.parse() {
            Ok(op) => op,
            Err(e) => {
                diagnostics.push(Diagnostic {
                    index,
                    op: spec.op_name().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        for name in op.inputs() {
            if !produced.contains(name) {
                diagnostics.push(Diagnostic {
                    index,
                    op: op.kind().to_string(),
                    message: format!("reads '{}' before any earlier step produces it", name),
                });
            }
        }

        if op.reads_output() && produced.is_empty() {
            diagnostics.push(Diagnostic {
                index,
                op: op.kind().to_string(),
                message: "writes output but no earlier step produces a dataset".to_string(),
            });
        }

        produced.extend(op.outputs().into_iter().map(String::from));
    }

    diagnostics
}

/// A request to run a pipeline, either from intent text or explicit steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,

    /// Pipeline label recorded with the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PipelineRequest {
    pub fn from_intent(text: impl Into<String>) -> Self {
        Self {
            intent_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn from_steps(steps: Vec<StepSpec>) -> Self {
        Self {
            steps: Some(steps),
            ..Default::default()
        }
    }

    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        Self {
            intent_text: None,
            steps: Some(pipeline.steps.clone()),
            schedule: pipeline.schedule.clone(),
            output: pipeline.output.clone(),
            label: Some(pipeline.name.clone()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }

    /// Explicit steps, if the request carries a non-empty list
    pub fn explicit_steps(&self) -> Option<&[StepSpec]> {
        self.steps.as_deref().filter(|s| !s.is_empty())
    }

    pub fn with_output_steps(&self, steps: Vec<StepSpec>) -> Vec<StepSpec> {
        effective_steps(&steps, self.output.as_ref())
    }
}

/// Step list and schedule produced for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePlan {
    pub steps: Vec<StepSpec>,
    pub schedule: Option<String>,
}
