//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    ExportCommand, HistoryCommand, PlanCommand, RunCommand, ScheduleCommand, ValidateCommand,
};
use std::ffi::OsString;

/// Tabular pipeline runner with run history and daily triggers
#[derive(Debug, Parser, Clone)]
#[command(name = "datapipe")]
#[command(version = "0.1.0")]
#[command(about = "Run tabular data pipelines and schedule them daily", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline file
    Run(RunCommand),

    /// Show the steps an intent resolves to
    Plan(PlanCommand),

    /// Check a pipeline file without running it
    Validate(ValidateCommand),

    /// Register a daily trigger and wait for it to fire
    Schedule(ScheduleCommand),

    /// Export a pipeline as an Airflow DAG file
    Export(ExportCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
