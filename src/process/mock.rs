//! Scripted command runner for unit tests

use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use async_trait::async_trait;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync>;

/// Records every command and answers with a responder closure
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responder: Responder,
}

impl ScriptedRunner {
    /// Every command succeeds with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::default()))
    }

    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, ProcessError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Recorded command lines, e.g. `git clone ...`
    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|spec| format!("{} {}", spec.program, spec.args.join(" ")))
            .collect()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.responder)(spec)
    }
}

/// Failure with the given stderr, as a real runner would report it
pub fn failure(spec: &CommandSpec, stderr: &str) -> ProcessError {
    ProcessError::Failed {
        command: spec.display(),
        code: 128,
        stderr: stderr.to_string(),
    }
}
