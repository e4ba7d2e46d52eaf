//! Turns triggers into runs: lane acquisition, execution, history

use crate::core::config::WorkflowConfig;
use crate::core::{Run, RunContext, Trigger};
use crate::execution::concurrency::ConcurrencyController;
use crate::execution::engine::{ExecutionEngine, RunError, RunEvent};
use crate::persistence::{create_summary, PersistenceBackend};
use crate::stages::StageExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default root for run workspaces
pub fn default_workspace_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sitepipe")
        .join("runs")
}

/// Dispatches triggers of one workflow
pub struct Dispatcher<S> {
    config: Arc<WorkflowConfig>,
    engine: Arc<ExecutionEngine<S>>,
    controller: ConcurrencyController,
    persistence: Option<Arc<dyn PersistenceBackend>>,
    workspace_root: PathBuf,
    keep_workspace: bool,
    shutdown: CancellationToken,
}

impl<S: StageExecutor + 'static> Dispatcher<S> {
    pub fn new(config: Arc<WorkflowConfig>, engine: Arc<ExecutionEngine<S>>) -> Self {
        let workspace_root = config
            .workspace_dir
            .clone()
            .unwrap_or_else(default_workspace_root);
        Self {
            config,
            engine,
            controller: ConcurrencyController::new(),
            persistence: None,
            workspace_root,
            keep_workspace: false,
            shutdown: CancellationToken::new(),
        }
    }

    /// Record finished runs in `persistence`
    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceBackend>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Leave run workspaces on disk for inspection
    pub fn keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = keep;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn engine(&self) -> &ExecutionEngine<S> {
        &self.engine
    }

    pub fn controller(&self) -> &ConcurrencyController {
        &self.controller
    }

    /// Token whose cancellation interrupts every run of this dispatcher
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the workflow for a trigger and return the finished run
    ///
    /// Fails only when the workflow does not accept the trigger. Every other
    /// outcome, including failure and cancellation, is recorded on the run.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<Run, RunError> {
        if !self.config.accepts(&trigger) {
            return Err(RunError::NotAccepted {
                workflow: self.config.name.clone(),
                trigger: trigger.kind(),
                git_ref: trigger.git_ref(),
            });
        }

        let mut run = self.config.to_run(trigger);
        let mut ctx = RunContext::new(self.config.clone(), &run, &self.workspace_root);
        let token = self.shutdown.child_token();
        info!("Run {} queued in {}", run.id(), run.group);

        match self
            .controller
            .acquire(
                &run.group,
                run.id(),
                &token,
                self.config.concurrency.cancel_in_progress,
            )
            .await
        {
            Ok(lane) => {
                if let Err(e) = self.engine.execute(&mut run, &mut ctx, &token).await {
                    debug!("Run {} ended with: {}", run.id(), e);
                }
                self.cleanup(&ctx);
                drop(lane);
            }
            Err(superseded) => {
                info!("{}", superseded);
                run.state.cancel(None, superseded.to_string());
                self.engine
                    .skip_remaining(&mut run, "superseded before start")
                    .await;
                self.engine
                    .emit_event(RunEvent::RunCancelled {
                        run_id: run.id(),
                        stage: None,
                    })
                    .await;
                self.engine
                    .emit_event(RunEvent::RunCompleted {
                        run_id: run.id(),
                        status: run.status(),
                    })
                    .await;
            }
        }

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_run(&create_summary(&run)).await {
                warn!("Failed to record run {}: {:#}", run.id(), e);
            }
        }

        Ok(run)
    }

    fn cleanup(&self, ctx: &RunContext) {
        if self.keep_workspace {
            info!("Keeping workspace {}", ctx.workspace.display());
            return;
        }
        if ctx.workspace.exists() {
            if let Err(e) = std::fs::remove_dir_all(&ctx.workspace) {
                warn!("Failed to remove {}: {}", ctx.workspace.display(), e);
            }
        }
    }
}
