//! CLI output formatting

use crate::core::{Row, RunStatus};
use crate::execution::ExecutionEvent;
use crate::persistence::RunRecord;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "@ ");

/// Spinner shown while waiting on triggers
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Success => style("SUCCESS").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// One line per run record
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        RunStatus::Success => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
    };

    let duration = record
        .finished_at
        .and_then(|finished| finished.signed_duration_since(record.started_at).to_std().ok())
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} {} - {} - {} - {} ({})",
        status_icon,
        style(format!("#{}", record.id)).dim(),
        style(&record.pipeline_label).bold(),
        format_status(record.status),
        style(record.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        duration
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            label,
            total_steps,
        } => format!(
            "{} Starting {} ({} steps{})",
            ROCKET,
            style(label).bold(),
            total_steps,
            run_id.map(|id| format!(", run #{}", id)).unwrap_or_default()
        ),
        ExecutionEvent::StepStarted { index, op } => {
            format!("{} [{}] {}", SPINNER, index, style(op).cyan())
        }
        ExecutionEvent::StepCompleted { index, op } => {
            format!("{} [{}] {}", CHECK, index, style(op).green())
        }
        ExecutionEvent::StepFailed {
            index,
            op,
            kind,
            error,
        } => format!(
            "{} [{}] {} {}: {}",
            CROSS,
            index,
            style(op).red(),
            style(kind).red().bold(),
            style(error).dim()
        ),
        ExecutionEvent::RunFinished { run_id, status } => format!(
            "{} Run{} {}",
            INFO,
            run_id.map(|id| format!(" #{}", id)).unwrap_or_default(),
            format_status(*status)
        ),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Render preview rows as a plain table no wider than `max_width`
pub fn format_preview(rows: &[Row], max_width: usize) -> String {
    let Some(first) = rows.first() else {
        return style("(no rows)").dim().to_string();
    };

    let headers: Vec<&String> = first.keys().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| match row.get(h.as_str()) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();

    let per_column = (max_width / headers.len().max(1)).saturating_sub(3).max(4);
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
                .min(per_column)
        })
        .collect();

    let render = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", truncate(v, *w), width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut lines = vec![render(headers.iter().map(|h| h.to_string()).collect())];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(cells.into_iter().map(render));
    lines.join("\n")
}

/// Terminal width, default to 80 if unavailable
pub fn terminal_width() -> usize {
    term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80)
}
