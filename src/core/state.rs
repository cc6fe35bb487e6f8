//! Run lifecycle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status stored in a run record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Interpreter state for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Tracks one run through `Pending -> Running -> {Succeeded, Failed}`.
///
/// Terminal phases are final; every other transition is rejected.
#[derive(Debug, Clone)]
pub struct RunLifecycle {
    phase: RunPhase,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    steps_completed: usize,
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Pending,
            started_at: None,
            finished_at: None,
            steps_completed: 0,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn start(&mut self) -> Result<(), String> {
        self.transition(RunPhase::Pending, RunPhase::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn step_completed(&mut self) {
        if self.phase == RunPhase::Running {
            self.steps_completed += 1;
        }
    }

    pub fn succeed(&mut self) -> Result<(), String> {
        self.transition(RunPhase::Running, RunPhase::Succeeded)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), String> {
        self.transition(RunPhase::Running, RunPhase::Failed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn steps_completed(&self) -> usize {
        self.steps_completed
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Run status for the record, once the run has left `Pending`
    pub fn status(&self) -> Option<RunStatus> {
        match self.phase {
            RunPhase::Pending => None,
            RunPhase::Running => Some(RunStatus::Running),
            RunPhase::Succeeded => Some(RunStatus::Success),
            RunPhase::Failed => Some(RunStatus::Failed),
        }
    }

    fn transition(&mut self, from: RunPhase, to: RunPhase) -> Result<(), String> {
        if self.phase != from {
            return Err(format!("invalid run transition {:?} -> {:?}", self.phase, to));
        }
        self.phase = to;
        Ok(())
    }
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
