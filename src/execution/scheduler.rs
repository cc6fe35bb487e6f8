//! Recurring daily triggers
//!
//! Each trigger owns a tokio task that sleeps until the next local
//! `hour:minute`, as read from the scheduler's [`Clock`], and then submits
//! its template through the
//! [`ExecutionEngine`], the same path on-demand requests take. Every fire
//! runs in its own task, so overlapping fires never share state. Triggers
//! live only in memory and are lost when the process exits.

use crate::core::{PipelineRequest, StepSpec};
use crate::error::PipelineError;
use crate::execution::{ExecutionEngine, PipelineResponse};
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Label recorded for scheduled runs without one
pub const SCHEDULED_LABEL: &str = "scheduled";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron spec '{0}'")]
    InvalidCronSpec(String),

    #[error("no trigger with id {0}")]
    UnknownTrigger(TriggerId),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Source of the current local time for trigger tasks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Daily firing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSpec {
    pub hour: u32,
    pub minute: u32,
}

impl CronSpec {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidCronSpec(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    /// Accepts `@daily`, `@midnight`, `HH:MM` or `M H * * *`
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidCronSpec(expr.to_string());
        let expr = expr.trim();

        if expr == "@daily" || expr == "@midnight" {
            return Self::new(0, 0);
        }

        if let Some((hour, minute)) = expr.split_once(':') {
            let hour = hour.trim().parse().map_err(|_| invalid())?;
            let minute = minute.trim().parse().map_err(|_| invalid())?;
            return Self::new(hour, minute).map_err(|_| invalid());
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, "*", "*", "*"] => {
                let minute = minute.parse().map_err(|_| invalid())?;
                let hour = hour.parse().map_err(|_| invalid())?;
                Self::new(hour, minute).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }

    /// First occurrence of `hour:minute` strictly after `now`, in `now`'s timezone.
    ///
    /// A time skipped by a DST jump moves to the next day.
    pub fn next_fire<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        for _ in 0..3 {
            if let Some(at) = date
                .and_hms_opt(self.hour, self.minute, 0)
                .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            {
                if at > *now {
                    return Some(at);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} * * *", self.minute, self.hour)
    }
}

impl FromStr for CronSpec {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a trigger submits on each fire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineTemplate {
    Intent(String),
    Steps(Vec<StepSpec>),
}

impl PipelineTemplate {
    pub fn to_request(&self, label: &str) -> PipelineRequest {
        let request = match self {
            PipelineTemplate::Intent(text) => PipelineRequest::from_intent(text.clone()),
            PipelineTemplate::Steps(steps) => PipelineRequest::from_steps(steps.clone()),
        };
        request.with_label(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(Uuid);

impl TriggerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A registered trigger
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub id: TriggerId,
    pub cron: CronSpec,
    pub template: PipelineTemplate,
    pub label: String,
}

struct TriggerEntry {
    trigger: Trigger,
    handle: JoinHandle<()>,
}

/// Owns the trigger registry and the trigger tasks
pub struct Scheduler {
    engine: Arc<ExecutionEngine>,
    triggers: Arc<RwLock<HashMap<TriggerId, TriggerEntry>>>,
    clock: Arc<dyn Clock>,
    /// Trigger tasks submit only while this is set
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self::with_clock(engine, Arc::new(SystemClock))
    }

    pub fn with_clock(engine: Arc<ExecutionEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            triggers: Arc::new(RwLock::new(HashMap::new())),
            clock,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the scheduler running; calling it again does nothing
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Scheduler started");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a daily trigger under the default label
    pub async fn register(&self, cron: CronSpec, template: PipelineTemplate) -> TriggerId {
        self.register_labeled(cron, template, SCHEDULED_LABEL).await
    }

    pub async fn register_labeled(
        &self,
        cron: CronSpec,
        template: PipelineTemplate,
        label: &str,
    ) -> TriggerId {
        self.start();

        let trigger = Trigger {
            id: TriggerId::new(),
            cron,
            template,
            label: label.to_string(),
        };
        let id = trigger.id;
        let handle = tokio::spawn(trigger_loop(
            self.engine.clone(),
            self.clock.clone(),
            self.running.clone(),
            trigger.clone(),
        ));

        info!("Registered trigger {} at {} for '{}'", id, cron, label);
        self.triggers
            .write()
            .await
            .insert(id, TriggerEntry { trigger, handle });
        id
    }

    /// Run `intent_text` every day at `hour:minute` local time
    pub async fn schedule_daily(
        &self,
        intent_text: &str,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerId, ScheduleError> {
        let cron = CronSpec::new(hour, minute)?;
        Ok(self
            .register(cron, PipelineTemplate::Intent(intent_text.to_string()))
            .await)
    }

    /// Stop and forget a trigger. Returns whether it existed.
    pub async fn remove(&self, id: TriggerId) -> bool {
        match self.triggers.write().await.remove(&id) {
            Some(entry) => {
                entry.handle.abort();
                info!("Removed trigger {}", id);
                true
            }
            None => false,
        }
    }

    /// Run a trigger's template once, now
    pub async fn fire_now(&self, id: TriggerId) -> Result<PipelineResponse, ScheduleError> {
        let trigger = self
            .triggers
            .read()
            .await
            .get(&id)
            .map(|entry| entry.trigger.clone())
            .ok_or(ScheduleError::UnknownTrigger(id))?;

        let request = trigger.template.to_request(&trigger.label);
        Ok(self.engine.submit(request).await?)
    }

    pub async fn triggers(&self) -> Vec<Trigger> {
        let mut triggers: Vec<Trigger> = self
            .triggers
            .read()
            .await
            .values()
            .map(|entry| entry.trigger.clone())
            .collect();
        triggers.sort_by_key(|t| (t.cron.hour, t.cron.minute));
        triggers
    }

    /// Abort every trigger task and clear the registry
    pub async fn shutdown(&self) {
        let mut triggers = self.triggers.write().await;
        self.running.store(false, Ordering::SeqCst);
        for (_, entry) in triggers.drain() {
            entry.handle.abort();
        }
        info!("Scheduler stopped");
    }
}

async fn trigger_loop(
    engine: Arc<ExecutionEngine>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    trigger: Trigger,
) {
    // each fire time is used at most once, even if the timer wakes early
    let mut last_fire = clock.now();
    loop {
        let now = clock.now();
        let Some(next) = trigger.cron.next_fire(&now.max(last_fire)) else {
            warn!("Trigger {} has no next fire time, retrying in an hour", trigger.id);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            continue;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        info!("Trigger {} fires at {}", trigger.id, next);
        tokio::time::sleep(wait).await;
        last_fire = next;

        if !running.load(Ordering::SeqCst) {
            info!("Trigger {} stopped before firing", trigger.id);
            break;
        }

        let engine = engine.clone();
        let trigger = trigger.clone();
        tokio::spawn(async move {
            let request = trigger.template.to_request(&trigger.label);
            match engine.submit(request).await {
                Ok(response) => info!(
                    "Trigger {} run {} finished with {} preview rows",
                    trigger.id,
                    response.run_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    response.preview.len()
                ),
                Err(e) => error!("Trigger {} run failed: {}", trigger.id, e),
            }
        });
    }
}
