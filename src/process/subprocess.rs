//! Subprocess runner - spawns external commands with tokio

use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Longest stderr excerpt kept in an error
const STDERR_TAIL: usize = 4000;

/// Runs commands as child processes
///
/// Children are spawned with `kill_on_drop`, so dropping the returned future
/// (for example when a run is cancelled) terminates the process.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let line = spec.display();
        debug!("Running `{}`", line);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let output = match spec.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| ProcessError::Timeout {
                    command: line.clone(),
                    secs: limit.as_secs(),
                })?,
            None => command.output().await,
        }
        .map_err(|source| ProcessError::Spawn {
            command: line.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = spec.redact(String::from_utf8_lossy(&output.stderr).trim());
            let code = output.status.code().unwrap_or(-1);
            warn!("`{}` exited with code {}: {}", line, code, stderr);
            return Err(ProcessError::Failed {
                command: line,
                code,
                stderr: tail(&stderr, STDERR_TAIL),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| ProcessError::Decode {
            command: line.clone(),
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        debug!("`{}` returned {} bytes of output", line, stdout.len());

        Ok(CommandOutput {
            stdout: spec.redact(&stdout),
            stderr: spec.redact(&stderr),
        })
    }
}

/// Keep the last `max` bytes of `text`, on a char boundary
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
