//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{Run, RunStatus, StageKind, TriggerKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow: String,

    /// Concurrency group the run occupied
    pub concurrency_group: String,

    /// Push or manual
    pub trigger: TriggerKind,

    /// Built ref, e.g. `refs/heads/main`
    pub git_ref: String,

    /// Commit that was built, if checkout got that far
    pub sha: Option<String>,

    /// Final status
    pub status: RunStatus,

    /// Stage that failed or was interrupted
    pub failed_stage: Option<StageKind>,

    /// Error text for failed and cancelled runs
    pub error: Option<String>,

    /// Manual inputs as recorded, empty for push runs
    pub inputs: BTreeMap<String, String>,

    /// When the run started (creation time if it never started)
    pub started_at: DateTime<Utc>,

    /// When the run finished
    pub completed_at: Option<DateTime<Utc>>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing an earlier save of the same run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs of a workflow, newest first
    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>>;

    /// List all workflow names with recorded runs
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.workflow == workflow)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a run
pub fn create_summary(run: &Run) -> RunSummary {
    let inputs = run
        .metadata
        .iter()
        .filter_map(|(k, v)| k.strip_prefix("input.").map(|k| (k.to_string(), v.clone())))
        .collect();

    RunSummary {
        run_id: run.id(),
        workflow: run.workflow.clone(),
        concurrency_group: run.group.to_string(),
        trigger: run.trigger.kind(),
        git_ref: run.trigger.git_ref(),
        sha: run.state.sha.clone(),
        status: run.status(),
        failed_stage: run.state.failed_stage,
        error: run.state.error.clone(),
        inputs,
        started_at: run.state.started_at.unwrap_or_else(Utc::now),
        completed_at: run.state.completed_at,
    }
}
