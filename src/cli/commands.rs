//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Build and publish a branch, as a push would
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Branch to build (defaults to the first push branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Commit to build instead of the branch head
    #[arg(long)]
    pub sha: Option<String>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Leave the run workspace on disk
    #[arg(long)]
    pub keep_workspace: bool,
}

/// Start a run through the manual trigger
#[derive(Debug, Args, Clone)]
pub struct DispatchCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Branch to build (defaults to the first push branch)
    #[arg(short = 'r', long = "ref")]
    pub git_ref: Option<String>,

    /// Value of the `log_level` input
    #[arg(long)]
    pub log_level: Option<String>,

    /// Value of the `tags` input
    #[arg(long)]
    pub tags: Option<String>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Leave the run workspace on disk
    #[arg(long)]
    pub keep_workspace: bool,
}

/// Poll the source repository and run on every push
#[derive(Debug, Args, Clone)]
pub struct WatchCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Seconds between polls
    #[arg(short, long, default_value_t = 30)]
    pub interval: u64,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}
