//! Run context - per-run directories and shared values

use crate::core::{config::WorkflowConfig, run::Run, trigger::Trigger};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Execution context handed to each stage of a run
///
/// Every run gets its own workspace directory so the build artifact is
/// produced fresh and never shared with another run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Run this context belongs to
    pub run_id: Uuid,

    /// Workflow configuration
    pub config: Arc<WorkflowConfig>,

    /// Event that started the run
    pub trigger: Trigger,

    /// Per-run workspace root
    pub workspace: PathBuf,

    /// Where the source tree is checked out
    pub checkout_dir: PathBuf,

    /// Where the target branch is staged for publishing
    pub publish_dir: PathBuf,

    /// Commit resolved by checkout
    pub sha: Option<String>,

    /// Run metadata
    pub metadata: BTreeMap<String, String>,
}

impl RunContext {
    /// Create the context of a run below `workspace_root`
    pub fn new(config: Arc<WorkflowConfig>, run: &Run, workspace_root: &Path) -> Self {
        let workspace = workspace_root.join(run.id().to_string());
        Self {
            run_id: run.id(),
            checkout_dir: workspace.join("source"),
            publish_dir: workspace.join("publish"),
            workspace,
            config,
            trigger: run.trigger.clone(),
            sha: run.trigger.sha().map(str::to_string),
            metadata: run.metadata.clone(),
        }
    }

    /// Generated output directory inside the checkout
    pub fn output_dir(&self) -> PathBuf {
        self.checkout_dir.join(&self.config.generator.output_dir)
    }

    /// Commit to mention in messages; falls back to the branch name
    pub fn commit_label(&self) -> String {
        self.sha
            .clone()
            .unwrap_or_else(|| self.trigger.branch().to_string())
    }
}
