//! CLI output formatting

use crate::{
    core::{RunStatus, StageKind, StageState},
    execution::RunEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a spinner for a running stage
pub fn create_stage_spinner(stage: StageKind) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
    {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(format!("{}...", stage.title()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// First eight characters of a run ID
pub fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a stage state for display
pub fn format_stage_state(state: &StageState) -> String {
    match state {
        StageState::Pending => style("PENDING").dim().to_string(),
        StageState::Running { .. } => style("RUNNING").yellow().to_string(),
        StageState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StageState::Failed { .. } => style("FAILED").red().to_string(),
        StageState::Cancelled { .. } => style("CANCELLED").yellow().to_string(),
        StageState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Cancelled => WARN,
        RunStatus::Pending => INFO,
    };

    let sha = summary
        .sha
        .as_deref()
        .map(|s| s[..s.len().min(8)].to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "{} {} - {} - {} {} @ {} - {}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.workflow).bold(),
        summary.trigger,
        style(&summary.git_ref).cyan(),
        style(sha).dim(),
        format_status(summary.status)
    );
    if let Some(stage) = summary.failed_stage {
        line.push_str(&format!(" ({})", stage));
    }
    line
}

/// Format a run event as a single line
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            run_id,
            workflow,
            trigger,
            git_ref,
            ..
        } => format!(
            "{} Starting {} on {} {} ({})",
            ROCKET,
            style(workflow).bold(),
            trigger,
            style(git_ref).cyan(),
            style(short_id(run_id)).dim()
        ),
        RunEvent::StageStarted { run_id, stage } => format!(
            "{} [{}/{}] {} ({})",
            SPINNER,
            stage.position(),
            StageKind::ALL.len(),
            style(stage.title()).cyan(),
            style(short_id(run_id)).dim()
        ),
        RunEvent::StageCompleted { stage, summary, .. } => {
            format!("{} {}: {}", CHECK, style(stage.title()).green(), summary)
        }
        RunEvent::StageFailed { stage, error, .. } => {
            format!("{} {}: {}", CROSS, style(stage.title()).red(), style(error).dim())
        }
        RunEvent::StageSkipped { stage, reason, .. } => {
            format!("{} {} ({})", SKIP, style(stage.title()).dim(), reason)
        }
        RunEvent::RunCancelled { run_id, stage } => match stage {
            Some(stage) => format!(
                "{} Run {} cancelled during {}",
                WARN,
                style(short_id(run_id)).dim(),
                stage
            ),
            None => format!(
                "{} Run {} superseded before it started",
                WARN,
                style(short_id(run_id)).dim()
            ),
        },
        RunEvent::RunCompleted { run_id, status } => format!(
            "{} Run ({}) {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format a duration as `1h 2m 3s`
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
