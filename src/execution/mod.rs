//! Pipeline execution: interpreter, submission engine and daily scheduler

pub mod engine;
pub mod export;
pub mod interpreter;
pub mod scheduler;

pub use engine::{ExecutionEngine, PipelineResponse};
pub use export::dag_from_steps;
pub use interpreter::{EventHandler, ExecutionEvent, Interpreter, RunOutcome};
pub use scheduler::{
    Clock, CronSpec, PipelineTemplate, ScheduleError, Scheduler, SystemClock, Trigger, TriggerId,
};
