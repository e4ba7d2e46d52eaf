//! sitepipe - build a static site and publish it to a git branch

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod process;
pub mod stages;

// Re-export commonly used types
pub use core::config::WorkflowConfig;
pub use core::{Run, RunContext, RunStatus, StageKind, StageState, Trigger, ManualInputs, ConcurrencyKey};
pub use execution::{ConcurrencyController, Dispatcher, ExecutionEngine, RunError, RunEvent};
pub use process::{CommandRunner, CommandSpec, ProcessError, SubprocessRunner};
pub use stages::{SiteStages, StageError, StageExecutor, StageReport};
