//! Watch mode: poll the source repository and dispatch a run per new push

use crate::core::Trigger;
use crate::execution::dispatcher::Dispatcher;
use crate::process::{CommandRunner, CommandSpec, ProcessError};
use crate::stages::StageExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parse `git ls-remote --heads` output into branch -> commit
pub fn parse_ls_remote(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (sha, reference) = line.split_once('\t')?;
            let branch = reference.trim().strip_prefix("refs/heads/")?;
            Some((branch.to_string(), sha.trim().to_string()))
        })
        .collect()
}

/// Polls the designated branches and dispatches push triggers
pub struct BranchWatcher<R, S> {
    runner: R,
    dispatcher: Arc<Dispatcher<S>>,
    interval: Duration,
    heads: HashMap<String, String>,
    initialized: bool,
}

impl<R: CommandRunner, S: StageExecutor + 'static> BranchWatcher<R, S> {
    pub fn new(runner: R, dispatcher: Arc<Dispatcher<S>>, interval: Duration) -> Self {
        Self {
            runner,
            dispatcher,
            interval,
            heads: HashMap::new(),
            initialized: false,
        }
    }

    fn branches(&self) -> Vec<String> {
        self.dispatcher
            .config()
            .triggers
            .push
            .as_ref()
            .map(|push| push.branches.clone())
            .unwrap_or_default()
    }

    /// Query branch heads once and return a trigger per moved branch
    ///
    /// The first successful poll only records the current heads. A branch
    /// that appears later counts as a push.
    pub async fn poll(&mut self) -> Result<Vec<Trigger>, ProcessError> {
        let branches = self.branches();
        let spec = CommandSpec::new("git")
            .args(["ls-remote", "--heads"])
            .arg(self.dispatcher.config().source.clone_url())
            .args(branches.iter().cloned());
        let output = self.runner.run(&spec).await?;
        let current = parse_ls_remote(&output.stdout);

        let first_poll = !self.initialized;
        self.initialized = true;
        let mut triggers = Vec::new();
        for branch in &branches {
            let Some(sha) = current.get(branch) else {
                continue;
            };
            let previous = self.heads.insert(branch.clone(), sha.clone());
            if !first_poll && previous.as_ref() != Some(sha) {
                info!("{} moved to {}", branch, sha);
                triggers.push(Trigger::push(branch.clone(), Some(sha.clone())));
            }
        }
        if first_poll {
            debug!("Watching {} branches", self.heads.len());
        }

        Ok(triggers)
    }

    /// Poll until `shutdown` is cancelled, running each push on its own task
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut runs = JoinSet::new();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll().await {
                Ok(triggers) => {
                    for trigger in triggers {
                        let dispatcher = self.dispatcher.clone();
                        runs.spawn(async move { dispatcher.dispatch(trigger).await });
                    }
                }
                Err(e) => warn!("Polling failed: {}", e),
            }

            while let Some(done) = runs.try_join_next() {
                if let Err(e) = done {
                    warn!("Run task failed: {}", e);
                }
            }
        }

        while let Some(done) = runs.join_next().await {
            if let Err(e) = done {
                warn!("Run task failed: {}", e);
            }
        }
    }
}
