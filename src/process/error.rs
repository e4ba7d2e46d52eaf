//! Subprocess error types

use thiserror::Error;

/// Error types for external command execution
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("`{command}` produced output that is not valid UTF-8")]
    Decode { command: String },
}

impl ProcessError {
    /// Exit code of a command that ran and failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
