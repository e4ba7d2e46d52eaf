//! Main execution engine - runs the stages of one run in order

use crate::{
    core::{Run, RunContext, RunStatus, StageKind, StageState, TriggerKind},
    execution::concurrency::Superseded,
    stages::{StageError, StageExecutor, StageReport},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        workflow: String,
        group: String,
        trigger: TriggerKind,
        git_ref: String,
    },
    StageStarted {
        run_id: Uuid,
        stage: StageKind,
    },
    StageCompleted {
        run_id: Uuid,
        stage: StageKind,
        summary: String,
    },
    StageFailed {
        run_id: Uuid,
        stage: StageKind,
        error: String,
    },
    StageSkipped {
        run_id: Uuid,
        stage: StageKind,
        reason: String,
    },
    RunCancelled {
        run_id: Uuid,
        stage: Option<StageKind>,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Why a run did not succeed
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },

    #[error("{stage} stage timed out after {secs} seconds")]
    Timeout { stage: StageKind, secs: u64 },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: StageKind },

    #[error(transparent)]
    Superseded(#[from] Superseded),

    #[error("workflow '{workflow}' does not run on {trigger} to {git_ref}")]
    NotAccepted {
        workflow: String,
        trigger: TriggerKind,
        git_ref: String,
    },
}

impl RunError {
    /// Stage the error happened in
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            RunError::Stage { stage, .. }
            | RunError::Timeout { stage, .. }
            | RunError::Cancelled { stage } => Some(*stage),
            RunError::Superseded(_) | RunError::NotAccepted { .. } => None,
        }
    }
}

enum StageOutcome {
    Done(Result<StageReport, StageError>),
    TimedOut(u64),
    Cancelled,
}

/// Runs checkout, build and publish, stopping at the first failure
pub struct ExecutionEngine<S> {
    stages: Arc<S>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
    stage_timeout: Option<Duration>,
}

impl<S: StageExecutor + 'static> ExecutionEngine<S> {
    pub fn new(stages: S) -> Self {
        Self {
            stages: Arc::new(stages),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            stage_timeout: None,
        }
    }

    /// Limit how long a single stage may run
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub(crate) async fn emit_event(&self, event: RunEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the run
    ///
    /// The outcome is recorded on `run`; the error only says why it did not
    /// succeed. Cancelling `cancel` interrupts the current stage.
    pub async fn execute(
        &self,
        run: &mut Run,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let run_id = run.id();

        info!(
            "Starting run {} of '{}' ({} {})",
            run_id,
            run.workflow,
            run.trigger.kind(),
            run.trigger.git_ref()
        );
        run.state.start();
        self.emit_event(RunEvent::RunStarted {
            run_id,
            workflow: run.workflow.clone(),
            group: run.group.to_string(),
            trigger: run.trigger.kind(),
            git_ref: run.trigger.git_ref(),
        })
        .await;

        for stage in StageKind::ALL {
            let started_at = Utc::now();
            run.stage_mut(stage).state = StageState::Running { started_at };
            self.emit_event(RunEvent::StageStarted { run_id, stage }).await;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => StageOutcome::Cancelled,
                outcome = self.run_stage(stage, ctx) => outcome,
            };

            match outcome {
                StageOutcome::Done(Ok(report)) => {
                    if let Some(sha) = report.sha {
                        ctx.sha = Some(sha.clone());
                        run.metadata.insert("sha".to_string(), sha.clone());
                        run.state.sha = Some(sha);
                    }
                    info!("{} stage succeeded: {}", stage.title(), report.summary);
                    run.stage_mut(stage).state = StageState::Succeeded {
                        summary: report.summary.clone(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                    self.emit_event(RunEvent::StageCompleted {
                        run_id,
                        stage,
                        summary: report.summary,
                    })
                    .await;
                }
                StageOutcome::Done(Err(source)) => {
                    let err = RunError::Stage { stage, source };
                    self.fail(run, stage, started_at, &err).await;
                    return Err(err);
                }
                StageOutcome::TimedOut(secs) => {
                    let err = RunError::Timeout { stage, secs };
                    self.fail(run, stage, started_at, &err).await;
                    return Err(err);
                }
                StageOutcome::Cancelled => {
                    warn!("Run {} cancelled during {}", run_id, stage);
                    run.stage_mut(stage).state = StageState::Cancelled {
                        started_at,
                        cancelled_at: Utc::now(),
                    };
                    run.state.cancel(
                        Some(stage),
                        format!("cancelled during {}: superseded or interrupted", stage),
                    );
                    self.skip_remaining(run, "run was cancelled").await;
                    self.emit_event(RunEvent::RunCancelled {
                        run_id,
                        stage: Some(stage),
                    })
                    .await;
                    self.emit_event(RunEvent::RunCompleted {
                        run_id,
                        status: RunStatus::Cancelled,
                    })
                    .await;
                    return Err(RunError::Cancelled { stage });
                }
            }
        }

        run.state.succeed();
        info!("Run {} succeeded", run_id);
        self.emit_event(RunEvent::RunCompleted {
            run_id,
            status: RunStatus::Succeeded,
        })
        .await;

        Ok(())
    }

    async fn run_stage(&self, stage: StageKind, ctx: &RunContext) -> StageOutcome {
        let fut = self.stages.execute(stage, ctx);
        match self.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => StageOutcome::Done(result),
                Err(_) => StageOutcome::TimedOut(limit.as_secs()),
            },
            None => StageOutcome::Done(fut.await),
        }
    }

    async fn fail(
        &self,
        run: &mut Run,
        stage: StageKind,
        started_at: chrono::DateTime<Utc>,
        err: &RunError,
    ) {
        let message = err.to_string();
        error!("Run {} failed: {}", run.id(), message);

        run.stage_mut(stage).state = StageState::Failed {
            error: message.clone(),
            started_at,
            failed_at: Utc::now(),
        };
        run.state.fail(stage, message.clone());
        self.emit_event(RunEvent::StageFailed {
            run_id: run.id(),
            stage,
            error: message,
        })
        .await;

        self.skip_remaining(run, &format!("{} failed", stage)).await;
        self.emit_event(RunEvent::RunCompleted {
            run_id: run.id(),
            status: RunStatus::Failed,
        })
        .await;
    }

    /// Skip every stage that has not started
    pub(crate) async fn skip_remaining(&self, run: &mut Run, reason: &str) {
        let pending: Vec<StageKind> = run
            .stages
            .iter()
            .filter(|r| matches!(r.state, StageState::Pending))
            .map(|r| r.kind)
            .collect();
        run.skip_pending(reason);
        for stage in pending {
            self.emit_event(RunEvent::StageSkipped {
                run_id: run.id(),
                stage,
                reason: reason.to_string(),
            })
            .await;
        }
    }
}
