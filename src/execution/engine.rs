//! Pipeline submission: request in, run outcome out

use crate::core::config::EngineConfig;
use crate::core::{PipelinePlan, PipelineRequest, Row, StepSpec};
use crate::error::PipelineError;
use crate::execution::{ExecutionEvent, Interpreter};
use crate::intent::{IntentResolver, RuleBasedResolver};
use crate::operators::{OperatorEnv, OperatorRegistry};
use crate::persistence::{RunId, RunRecord, RunRecorder};
use crate::sinks::Sinks;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Response for a successful submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub preview: Vec<Row>,
}

/// Entry point for on-demand and scheduled runs
pub struct ExecutionEngine {
    interpreter: Arc<Interpreter>,
    resolver: Arc<dyn IntentResolver>,
}

impl ExecutionEngine {
    pub fn new(interpreter: Interpreter, resolver: Arc<dyn IntentResolver>) -> Self {
        Self {
            interpreter: Arc::new(interpreter),
            resolver,
        }
    }

    /// Wire sinks, run history and the rule-based resolver from configuration.
    ///
    /// With `history` off, or when the audit store cannot be opened, runs
    /// are executed without being recorded.
    pub async fn from_config(config: &EngineConfig, history: bool) -> Self {
        let sinks = Sinks::from_config(config).await;
        let recorder = if history {
            open_recorder(config).await
        } else {
            RunRecorder::degraded()
        };

        let interpreter = Interpreter::new(
            OperatorRegistry::with_defaults(),
            OperatorEnv::new(sinks),
            recorder,
        )
        .with_preview_rows(config.preview_rows);

        Self::new(interpreter, Arc::new(RuleBasedResolver::default()))
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.interpreter.add_event_handler(handler).await;
    }

    /// Steps and schedule a request would run with, without running it.
    ///
    /// Explicit non-empty steps win over intent text. Intent plans keep the
    /// resolver's schedule unless the request sets one.
    pub async fn plan(&self, request: &PipelineRequest) -> Result<PipelinePlan, PipelineError> {
        if let Some(steps) = request.explicit_steps() {
            return Ok(PipelinePlan {
                steps: request.with_output_steps(steps.to_vec()),
                schedule: request.schedule.clone(),
            });
        }

        match request.intent_text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                let plan = self.resolver.resolve(text).await?;
                debug!("Intent resolved to {} steps", plan.steps.len());
                Ok(PipelinePlan {
                    steps: request.with_output_steps(plan.steps),
                    schedule: request.schedule.clone().or(plan.schedule),
                })
            }
            _ => Ok(PipelinePlan {
                steps: request.with_output_steps(Vec::new()),
                schedule: request.schedule.clone(),
            }),
        }
    }

    /// Plan the request, then run it
    pub async fn submit(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        let plan = self.plan(&request).await?;
        self.run_steps(request.label(), &plan.steps).await
    }

    /// Run an explicit step list under a label
    pub async fn run_steps(&self, label: &str, steps: &[StepSpec]) -> Result<PipelineResponse, PipelineError> {
        let outcome = self.interpreter.execute(label, steps).await?;
        Ok(PipelineResponse {
            status: "ok".to_string(),
            run_id: outcome.run_id,
            preview: outcome.preview,
        })
    }

    /// Most recent runs first
    pub async fn recent_runs(&self, limit: usize) -> Vec<RunRecord> {
        self.interpreter.recorder().recent(limit).await
    }
}

#[cfg(feature = "sqlite")]
async fn open_recorder(config: &EngineConfig) -> RunRecorder {
    use crate::persistence::SqliteRunStore;

    let url = match config.audit_database_url() {
        Ok(url) => url,
        Err(e) => {
            warn!("Run history disabled: {:#}", e);
            return RunRecorder::degraded();
        }
    };
    match SqliteRunStore::connect(&url, config.max_connections).await {
        Ok(store) => {
            info!("Run history: {}", url);
            RunRecorder::new(Arc::new(store))
        }
        Err(e) => {
            warn!("Run history unavailable ({}), runs will not be recorded", e);
            RunRecorder::degraded()
        }
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_recorder(_config: &EngineConfig) -> RunRecorder {
    warn!("Built without sqlite support, runs will not be recorded");
    RunRecorder::degraded()
}
