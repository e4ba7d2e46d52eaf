//! Execution state models

use crate::core::stage::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is created but has not acquired its concurrency lane yet
    Pending,
    /// Run is executing its stages
    Running,
    /// Checkout, build and publish all succeeded
    Succeeded,
    /// A stage failed
    Failed,
    /// Run was superseded by a newer run in the same concurrency group
    Cancelled,
}

impl RunStatus {
    /// Check if the run has finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// State of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageState {
    /// Stage has not started
    Pending,
    /// Stage is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Stage completed successfully
    Succeeded {
        summary: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Stage failed, the run stops here
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Stage was interrupted because the run was cancelled
    Cancelled {
        started_at: DateTime<Utc>,
        cancelled_at: DateTime<Utc>,
    },
    /// Stage never ran because an earlier stage did not succeed
    Skipped {
        reason: String,
    },
}

impl StageState {
    /// Check if stage is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageState::Pending | StageState::Running { .. })
    }

    /// When the stage started, if it ever did
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            StageState::Running { started_at }
            | StageState::Succeeded { started_at, .. }
            | StageState::Failed { started_at, .. }
            | StageState::Cancelled { started_at, .. } => Some(*started_at),
            StageState::Pending | StageState::Skipped { .. } => None,
        }
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current run status
    pub status: RunStatus,

    /// When the run started executing stages
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Commit the run built, once checkout resolved it
    pub sha: Option<String>,

    /// Stage that failed or was interrupted
    pub failed_stage: Option<StageKind>,

    /// Error text of the failure
    pub error: Option<String>,
}

impl RunState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            sha: None,
            failed_stage: None,
            error: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark run as succeeded
    pub fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed at the given stage
    pub fn fail(&mut self, stage: StageKind, error: String) {
        self.status = RunStatus::Failed;
        self.failed_stage = Some(stage);
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as cancelled, optionally recording the interrupted stage
    pub fn cancel(&mut self, stage: Option<StageKind>, reason: impl Into<String>) {
        self.status = RunStatus::Cancelled;
        self.failed_stage = stage;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
