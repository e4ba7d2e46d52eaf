//! External command execution (git and the site generator)

pub mod command;
pub mod error;
pub mod subprocess;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::sync::Arc;

pub use command::{redact, CommandOutput, CommandSpec, REDACTED};
pub use error::ProcessError;
pub use subprocess::SubprocessRunner;

/// Trait for running external commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion; a non-zero exit is an error
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        (**self).run(spec).await
    }
}
