//! Test utility functions for sitepipe

#![allow(dead_code)]

use async_trait::async_trait;
use sitepipe::core::config::WorkflowConfig;
use sitepipe::core::{Run, RunContext, RunStatus, StageKind, StageState};
use sitepipe::execution::{Dispatcher, ExecutionEngine};
use sitepipe::persistence::InMemoryPersistence;
use sitepipe::stages::{StageError, StageExecutor, StageReport};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Push and manual triggers on `main`, default concurrency settings
pub const WORKFLOW: &str = r#"
name: "Deploy"
on:
  push:
    branches: ["main"]
  manual:
    inputs:
      log_level:
        default: "warning"
      tags:
        default: ""
source:
  repository: "https://example.com/owner/blog.git"
generator:
  version: "0.119.0"
  extended: true
publish:
  repository: "https://example.com/owner/site.git"
  branch: "master"
"#;

/// Same workflow, but a newer run waits instead of cancelling
pub fn queued_workflow() -> String {
    WORKFLOW.replace(
        "source:",
        "concurrency:\n  cancel_in_progress: false\nsource:",
    )
}

/// One stage invocation seen by [`MockStages`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: StageKind,
    /// Commit pinned by the trigger, if any
    pub sha: Option<String>,
}

/// Stage executor that records invocations instead of running git
///
/// Checkout resolves the pinned commit (or `head`), publish records the
/// commit it would have pushed.
#[derive(Default)]
pub struct MockStages {
    fail_at: Option<StageKind>,
    hold_build_of: Option<String>,
    invocations: Mutex<Vec<Invocation>>,
    published: Mutex<Vec<String>>,
    /// Signalled when a held build starts
    pub held: Notify,
    /// Lets a held build finish
    pub release: Notify,
}

impl MockStages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: StageKind) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    /// Hold the build of runs pinned to `sha` until [`MockStages::release`]
    pub fn holding_build_of(sha: &str) -> Self {
        Self {
            hold_build_of: Some(sha.to_string()),
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn stages_for(&self, sha: &str) -> Vec<StageKind> {
        self.invocations()
            .into_iter()
            .filter(|i| i.sha.as_deref() == Some(sha))
            .map(|i| i.stage)
            .collect()
    }

    /// Commits that reached publish, in order
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageExecutor for MockStages {
    async fn execute(&self, stage: StageKind, ctx: &RunContext) -> Result<StageReport, StageError> {
        let pinned = ctx.trigger.sha().map(str::to_string);
        self.invocations.lock().unwrap().push(Invocation {
            stage,
            sha: pinned.clone(),
        });

        if self.fail_at == Some(stage) {
            return Err(StageError::MissingOutput(ctx.output_dir()));
        }

        match stage {
            StageKind::Checkout => {
                let sha = pinned.unwrap_or_else(|| "head".to_string());
                Ok(StageReport::new(format!("checked out {}", sha)).with_sha(sha))
            }
            StageKind::Build => {
                if pinned.is_some() && pinned == self.hold_build_of {
                    self.held.notify_one();
                    self.release.notified().await;
                }
                Ok(StageReport::new("generated 1 files in public"))
            }
            StageKind::Publish => {
                let sha = ctx.sha.clone().unwrap_or_default();
                self.published.lock().unwrap().push(sha.clone());
                Ok(StageReport::new(format!("pushed {}", sha)))
            }
        }
    }
}

/// Dispatcher over [`MockStages`] recording history in memory
pub fn dispatcher(
    yaml: &str,
    stages: MockStages,
    workspace_root: &Path,
    history: Arc<InMemoryPersistence>,
) -> Dispatcher<MockStages> {
    let config = WorkflowConfig::from_yaml(yaml).expect("valid workflow");
    let engine = ExecutionEngine::new(stages);
    Dispatcher::new(Arc::new(config), Arc::new(engine))
        .with_workspace_root(workspace_root)
        .with_persistence(history)
}

/// Assert that the run succeeded through all three stages
pub fn assert_run_succeeded(run: &Run) {
    assert_eq!(
        run.status(),
        RunStatus::Succeeded,
        "run failed: {:?}",
        run.state.error
    );
    assert_eq!(run.succeeded_stages(), StageKind::ALL.to_vec());
}

/// Assert that the run failed at `stage` and nothing after it started
pub fn assert_run_failed_at(run: &Run, stage: StageKind) {
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.state.failed_stage, Some(stage));
    for record in &run.stages {
        if record.kind.position() > stage.position() {
            assert!(
                matches!(record.state, StageState::Skipped { .. }),
                "{} should be skipped, was {:?}",
                record.kind,
                record.state
            );
        }
    }
}
