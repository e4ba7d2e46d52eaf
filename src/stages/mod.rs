//! Pipeline stages: checkout, build and publish

pub mod build;
pub mod checkout;
pub mod publish;
pub mod sync;

use crate::core::{RunContext, StageKind};
use crate::process::{CommandRunner, ProcessError};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// What a successful stage hands back to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// One-line description for output and history
    pub summary: String,

    /// Commit resolved by the stage (checkout only)
    pub sha: Option<String>,
}

impl StageReport {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            sha: None,
        }
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }
}

/// Error types for stage execution
#[derive(Debug, Error)]
pub enum StageError {
    #[error("checkout failed: {0}")]
    Checkout(ProcessError),

    #[error("generator failed: {0}")]
    Generator(ProcessError),

    #[error("generator version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("generator did not produce output directory {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("publish failed: {0}")]
    Publish(ProcessError),

    #[error("deploy credential variable {0} is not set")]
    MissingCredential(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StageError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Trait for stage execution - the engine is generic over it
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Run one stage of a run
    async fn execute(&self, stage: StageKind, ctx: &RunContext) -> Result<StageReport, StageError>;
}

/// Stages backed by git and the configured generator
#[derive(Debug, Clone)]
pub struct SiteStages<R> {
    runner: R,
}

impl<R: CommandRunner> SiteStages<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl<R: CommandRunner> StageExecutor for SiteStages<R> {
    async fn execute(&self, stage: StageKind, ctx: &RunContext) -> Result<StageReport, StageError> {
        match stage {
            StageKind::Checkout => checkout::run(&self.runner, ctx).await,
            StageKind::Build => build::run(&self.runner, ctx).await,
            StageKind::Publish => publish::run(&self.runner, ctx).await,
        }
    }
}

/// Remove a directory left over from an earlier attempt
pub(crate) fn reset_dir(dir: &std::path::Path) -> Result<(), StageError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .map_err(|e| StageError::io(format!("failed to clear {}", dir.display()), e))?;
    }
    Ok(())
}
