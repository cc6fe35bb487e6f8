//! Step interpreter: runs one step list against a fresh context

use crate::core::{ExecutionContext, Row, RunLifecycle, RunStatus, StepSpec};
use crate::error::{ErrorKind, PipelineError};
use crate::operators::{OperatorEnv, OperatorError, OperatorRegistry};
use crate::persistence::{Recorded, RunId, RunRecorder};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Events that can occur during a run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Option<RunId>,
        label: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        op: String,
    },
    StepCompleted {
        index: usize,
        op: String,
    },
    StepFailed {
        index: usize,
        op: String,
        kind: ErrorKind,
        error: String,
    },
    RunFinished {
        run_id: Option<RunId>,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// What a successful run hands back
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: Option<RunId>,
    /// Name of the dataset the preview was taken from
    pub output: Option<String>,
    pub preview: Vec<Row>,
    pub steps_completed: usize,
}

fn transition(result: Result<(), String>) {
    if let Err(e) = result {
        error!("Invalid run transition: {}", e);
    }
}

/// Executes step lists, one fresh [`ExecutionContext`] and run record per call.
///
/// Steps run strictly in order and the first error stops the run.
pub struct Interpreter {
    registry: OperatorRegistry,
    env: OperatorEnv,
    recorder: RunRecorder,
    preview_rows: usize,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl Interpreter {
    pub fn new(registry: OperatorRegistry, env: OperatorEnv, recorder: RunRecorder) -> Self {
        Self {
            registry,
            env,
            recorder,
            preview_rows: 10,
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    pub fn recorder(&self) -> &RunRecorder {
        &self.recorder
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute `steps` under the given pipeline label
    pub async fn execute(&self, label: &str, steps: &[StepSpec]) -> Result<RunOutcome, PipelineError> {
        let mut lifecycle = RunLifecycle::new();
        transition(lifecycle.start());

        let run = self.recorder.open(label).await;
        let run_id = run.stored();
        info!(
            "Starting run {} for '{}' ({} steps)",
            run_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            label,
            steps.len()
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            label: label.to_string(),
            total_steps: steps.len(),
        })
        .await;

        let mut ctx = ExecutionContext::new();

        for (index, spec) in steps.iter().enumerate() {
            let op = spec.op_name().to_string();
            info!("Step {} ({}) started", index, op);
            self.emit_event(ExecutionEvent::StepStarted {
                index,
                op: op.clone(),
            })
            .await;

            if let Err(source) = self.run_step(spec, &mut ctx).await {
                error!("Step {} ({}) failed: {}", index, op, source);
                self.emit_event(ExecutionEvent::StepFailed {
                    index,
                    op: op.clone(),
                    kind: source.kind(),
                    error: source.to_string(),
                })
                .await;

                transition(lifecycle.fail());
                self.finish(run, RunStatus::Failed).await;
                return Err(PipelineError::Step { index, op, source });
            }

            lifecycle.step_completed();
            info!("Step {} ({}) completed", index, op);
            self.emit_event(ExecutionEvent::StepCompleted { index, op }).await;
        }

        let output = ctx.output_name().map(String::from);
        let preview = output
            .as_deref()
            .and_then(|name| ctx.get(name).ok())
            .map(|dataset| dataset.head(self.preview_rows))
            .unwrap_or_default();

        transition(lifecycle.succeed());
        self.finish(run, RunStatus::Success).await;

        Ok(RunOutcome {
            run_id,
            output,
            preview,
            steps_completed: lifecycle.steps_completed(),
        })
    }

    /// Resolve, parse and apply one step
    async fn run_step(&self, spec: &StepSpec, ctx: &mut ExecutionContext) -> Result<(), OperatorError> {
        let kind = spec.kind()?;
        let operator = self
            .registry
            .get(kind)
            .ok_or_else(|| OperatorError::UnknownOperation(kind.to_string()))?;
        let op = spec.parse()?;
        operator.apply(&op, ctx, &self.env).await
    }

    async fn finish(&self, run: Recorded<RunId>, status: RunStatus) {
        if self.recorder.close(run, status).await.is_degraded() && !self.recorder.is_degraded() {
            warn!("Run finished as {} but the record was not updated", status);
        }
        info!("Run finished: {}", status);
        self.emit_event(ExecutionEvent::RunFinished {
            run_id: run.stored(),
            status,
        })
        .await;
    }
}
