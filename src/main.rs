use anyhow::{bail, Context, Result};
use datapipe::cli::commands::{
    ExportCommand, HistoryCommand, PlanCommand, RunCommand, ScheduleCommand, ValidateCommand,
};
use datapipe::cli::output::*;
use datapipe::cli::{Cli, Command};
use datapipe::core::config::{EngineConfig, PipelineConfig};
use datapipe::core::PipelineRequest;
use datapipe::execution::scheduler::SCHEDULED_LABEL;
use datapipe::execution::{dag_from_steps, CronSpec, ExecutionEngine, PipelineTemplate, Scheduler};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load engine config")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &config).await?,
        Command::Plan(cmd) => plan_pipeline(cmd, &config).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Schedule(cmd) => schedule_pipeline(cmd, &config).await?,
        Command::Export(cmd) => export_pipeline(cmd, &config).await?,
        Command::History(cmd) => show_history(cmd, &config).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, config: &EngineConfig) -> Result<()> {
    let pipeline_config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    println!(
        "{} Loaded pipeline: {}",
        INFO,
        style(&pipeline_config.name).bold()
    );

    let engine = ExecutionEngine::from_config(config, !cmd.no_history).await;
    let json = cmd.json;
    engine
        .add_event_handler(move |event| {
            if !json {
                println!("{}", format_execution_event(&event));
            }
        })
        .await;

    let pipeline = pipeline_config.to_pipeline();
    let mut request = PipelineRequest::from_pipeline(&pipeline);
    if let Some(label) = &cmd.label {
        request = request.with_label(label);
    }

    match engine.submit(request).await {
        Ok(response) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("\n{}", format_preview(&response.preview, terminal_width()));
                println!(
                    "\n{} {} completed {}",
                    CHECK,
                    style(&pipeline.name).bold(),
                    style("successfully").green()
                );
            }
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {} ({})",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red(),
                e.kind()
            );
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn plan_pipeline(cmd: &PlanCommand, config: &EngineConfig) -> Result<()> {
    let engine = ExecutionEngine::from_config(config, false).await;
    let mut request = PipelineRequest::from_intent(cmd.intent.clone());
    request.schedule = cmd.schedule.clone();

    let plan = engine.plan(&request).await.context("Failed to resolve intent")?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    if !cmd.json {
        println!("{} Validating pipeline...", INFO);
    }

    let config = match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    let pipeline = config.to_pipeline();
    let diagnostics = pipeline.check();

    if cmd.json {
        let data = serde_json::json!({
            "name": pipeline.name,
            "steps": pipeline.effective_steps(),
            "diagnostics": diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        if !diagnostics.is_empty() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if diagnostics.is_empty() {
        println!("{} Pipeline configuration is valid!", CHECK);
        println!("  Name: {}", style(&pipeline.name).bold());
        println!("  Steps: {}", style(pipeline.effective_steps().len()).cyan());
        if let Some(schedule) = &pipeline.schedule {
            println!("  Schedule: {}", style(schedule).cyan());
        }
        Ok(())
    } else {
        println!("{} Validation failed:", CROSS);
        for diagnostic in &diagnostics {
            println!("  {}", style(diagnostic).red());
        }
        std::process::exit(1);
    }
}

async fn schedule_pipeline(cmd: &ScheduleCommand, config: &EngineConfig) -> Result<()> {
    let (template, label, file_schedule) = match (&cmd.intent, &cmd.file) {
        (Some(intent), _) => (PipelineTemplate::Intent(intent.clone()), SCHEDULED_LABEL.to_string(), None),
        (None, Some(file)) => {
            let pipeline = PipelineConfig::from_file(file)
                .context("Failed to load pipeline config")?
                .to_pipeline();
            let steps = pipeline.effective_steps();
            (PipelineTemplate::Steps(steps), pipeline.name, pipeline.schedule)
        }
        (None, None) => bail!("Either --intent or --file is required"),
    };

    let cron = match (&cmd.at, cmd.hour, cmd.minute, &file_schedule) {
        (Some(at), _, _, _) => CronSpec::parse(at)?,
        (None, Some(hour), minute, _) => CronSpec::new(hour, minute.unwrap_or(0))?,
        (None, None, Some(minute), _) => CronSpec::new(0, minute)?,
        (None, None, None, Some(schedule)) => CronSpec::parse(schedule)?,
        (None, None, None, None) => CronSpec::new(0, 0)?,
    };

    let engine = Arc::new(ExecutionEngine::from_config(config, !cmd.no_history).await);
    engine
        .add_event_handler(|event| println!("{}", format_execution_event(&event)))
        .await;

    let scheduler = Scheduler::new(engine);
    scheduler.start();
    let id = scheduler.register_labeled(cron, template, &label).await;
    println!(
        "{} Registered trigger {} ({})",
        CLOCK,
        style(id).dim(),
        style(cron).cyan()
    );

    if cmd.now {
        if let Err(e) = scheduler.fire_now(id).await {
            println!("{} Immediate run failed: {}", WARN, style(e).red());
        }
    }

    let spinner = create_spinner("Waiting for triggers (Ctrl-C to stop)");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    spinner.finish_and_clear();

    scheduler.shutdown().await;
    println!("{} Scheduler stopped", INFO);
    Ok(())
}

async fn export_pipeline(cmd: &ExportCommand, config: &EngineConfig) -> Result<()> {
    let steps = match (&cmd.intent, &cmd.file) {
        (Some(intent), _) => {
            let engine = ExecutionEngine::from_config(config, false).await;
            let request = PipelineRequest::from_intent(intent.clone());
            engine.plan(&request).await.context("Failed to resolve intent")?.steps
        }
        (None, Some(file)) => PipelineConfig::from_file(file)
            .context("Failed to load pipeline config")?
            .to_pipeline()
            .effective_steps(),
        (None, None) => bail!("Either --intent or --file is required"),
    };

    let dag = dag_from_steps(&cmd.dag_id, &steps);
    match &cmd.output {
        Some(path) => {
            std::fs::write(path, dag).with_context(|| format!("Failed to write {}", path))?;
            println!(
                "{} Exported {} steps to {}",
                CHECK,
                style(steps.len()).cyan(),
                style(path).bold()
            );
        }
        None => print!("{}", dag),
    }
    Ok(())
}

async fn show_history(cmd: &HistoryCommand, config: &EngineConfig) -> Result<()> {
    let engine = ExecutionEngine::from_config(config, true).await;
    let recorder = engine.interpreter().recorder();
    if recorder.is_degraded() {
        println!("{} Run history is unavailable", WARN);
        return Ok(());
    }

    if let Some(id) = cmd.run_id {
        match recorder.get(id).await {
            Some(record) if cmd.json => println!("{}", serde_json::to_string_pretty(&record)?),
            Some(record) => println!("  {}", format_run_record(&record)),
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = engine.recent_runs(cmd.limit).await;
    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for record in &runs {
            println!("  {}", format_run_record(record));
        }
    }

    Ok(())
}
