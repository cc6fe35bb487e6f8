//! CLI command definitions

use clap::{ArgGroup, Args};

/// Run a pipeline file
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML/JSON file
    #[arg(short, long)]
    pub file: String,

    /// Don't record the run in history
    #[arg(long)]
    pub no_history: bool,

    /// Label stored with the run (defaults to the pipeline name)
    #[arg(long)]
    pub label: Option<String>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

/// Resolve an intent to steps
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Free-text description of the pipeline
    #[arg(short, long)]
    pub intent: String,

    /// Schedule expression to attach to the plan
    #[arg(long)]
    pub schedule: Option<String>,
}

/// Validate a pipeline file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML/JSON file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Register a daily trigger
#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("template").required(true).args(["intent", "file"])))]
pub struct ScheduleCommand {
    /// Intent text resolved on every fire
    #[arg(short, long)]
    pub intent: Option<String>,

    /// Pipeline file whose steps run on every fire
    #[arg(short, long)]
    pub file: Option<String>,

    /// Firing time: `HH:MM`, `@daily` or `M H * * *`
    #[arg(long, conflicts_with_all = ["hour", "minute"])]
    pub at: Option<String>,

    /// Firing hour (0-23)
    #[arg(long)]
    pub hour: Option<u32>,

    /// Firing minute (0-59)
    #[arg(long)]
    pub minute: Option<u32>,

    /// Also run once right after registering
    #[arg(long)]
    pub now: bool,

    /// Don't record runs in history
    #[arg(long)]
    pub no_history: bool,
}

/// Export a pipeline as an Airflow DAG file
#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("source").required(true).args(["intent", "file"])))]
pub struct ExportCommand {
    /// Intent text to resolve into steps
    #[arg(short, long)]
    pub intent: Option<String>,

    /// Pipeline file whose steps are exported
    #[arg(short, long)]
    pub file: Option<String>,

    /// DAG id written into the file
    #[arg(long, default_value = "generated_etl")]
    pub dag_id: String,

    /// Write the DAG here instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<i64>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
