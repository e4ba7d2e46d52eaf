//! Run domain model

use crate::core::{
    config::WorkflowConfig,
    stage::{StageKind, StageRecord},
    state::{RunState, RunStatus, StageState},
    trigger::{ConcurrencyKey, Trigger},
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One execution of the checkout, build and publish sequence
#[derive(Debug, Clone)]
pub struct Run {
    /// Workflow name
    pub workflow: String,

    /// Event that started the run
    pub trigger: Trigger,

    /// Concurrency group the run occupies
    pub group: ConcurrencyKey,

    /// Stages in execution order
    pub stages: Vec<StageRecord>,

    /// Execution state
    pub state: RunState,

    /// Opaque metadata (manual inputs, resolved commit)
    pub metadata: BTreeMap<String, String>,
}

impl Run {
    /// Create a run of the workflow for a trigger
    pub fn new(config: &WorkflowConfig, trigger: Trigger) -> Self {
        let group = config.concurrency_key(&trigger);

        let mut metadata = BTreeMap::new();
        metadata.insert("trigger".to_string(), trigger.kind().to_string());
        metadata.insert("ref".to_string(), trigger.git_ref());
        if let Some(inputs) = trigger.inputs() {
            metadata.insert("input.log_level".to_string(), inputs.log_level.clone());
            metadata.insert("input.tags".to_string(), inputs.tags.clone());
        }

        Run {
            workflow: config.name.clone(),
            trigger,
            group,
            stages: StageKind::ALL.iter().map(|k| StageRecord::new(*k)).collect(),
            state: RunState::new(),
            metadata,
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Get a stage record
    pub fn stage(&self, kind: StageKind) -> &StageRecord {
        &self.stages[kind.position() - 1]
    }

    /// Get a mutable stage record
    pub fn stage_mut(&mut self, kind: StageKind) -> &mut StageRecord {
        &mut self.stages[kind.position() - 1]
    }

    /// Mark every stage that has not started as skipped
    pub fn skip_pending(&mut self, reason: &str) {
        for record in &mut self.stages {
            if matches!(record.state, StageState::Pending) {
                record.state = StageState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Stages that completed successfully
    pub fn succeeded_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|r| r.is_succeeded())
            .map(|r| r.kind)
            .collect()
    }

    /// Stages that were started, in order
    pub fn invoked_stages(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .filter(|r| r.was_invoked())
            .map(|r| r.kind)
            .collect()
    }

    /// Short form of the built commit
    pub fn short_sha(&self) -> Option<&str> {
        self.state.sha.as_deref().map(|sha| &sha[..sha.len().min(8)])
    }
}
