//! Trigger events and concurrency group keys

use crate::core::config::ManualInputsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which kind of event started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Push,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Push => "push",
            TriggerKind::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(TriggerKind::Push),
            "manual" => Ok(TriggerKind::Manual),
            other => Err(format!("unknown trigger kind: {}", other)),
        }
    }
}

/// The two free-form inputs of a manual trigger.
///
/// They are recorded on the run and in history. No stage reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualInputs {
    pub log_level: String,
    pub tags: String,
}

impl ManualInputs {
    /// Fill missing values from the configured defaults
    pub fn resolve(
        config: &ManualInputsConfig,
        log_level: Option<String>,
        tags: Option<String>,
    ) -> Self {
        Self {
            log_level: log_level.unwrap_or_else(|| config.log_level.default.clone()),
            tags: tags.unwrap_or_else(|| config.tags.default.clone()),
        }
    }
}

/// An event that asks for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Trigger {
    /// A push to a branch; `sha` pins the commit, otherwise the branch head is built
    Push { branch: String, sha: Option<String> },
    /// A manual dispatch on a branch
    Manual { branch: String, inputs: ManualInputs },
}

impl Trigger {
    pub fn push(branch: impl Into<String>, sha: Option<String>) -> Self {
        Trigger::Push {
            branch: branch.into(),
            sha,
        }
    }

    pub fn manual(branch: impl Into<String>, inputs: ManualInputs) -> Self {
        Trigger::Manual {
            branch: branch.into(),
            inputs,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Push { .. } => TriggerKind::Push,
            Trigger::Manual { .. } => TriggerKind::Manual,
        }
    }

    pub fn branch(&self) -> &str {
        match self {
            Trigger::Push { branch, .. } | Trigger::Manual { branch, .. } => branch,
        }
    }

    /// Fully qualified ref, e.g. `refs/heads/main`
    pub fn git_ref(&self) -> String {
        format!("refs/heads/{}", self.branch())
    }

    /// Commit pinned by the trigger, if any
    pub fn sha(&self) -> Option<&str> {
        match self {
            Trigger::Push { sha, .. } => sha.as_deref(),
            Trigger::Manual { .. } => None,
        }
    }

    pub fn inputs(&self) -> Option<&ManualInputs> {
        match self {
            Trigger::Manual { inputs, .. } => Some(inputs),
            Trigger::Push { .. } => None,
        }
    }
}

/// Key of a concurrency group: at most one active run per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConcurrencyKey(String);

impl ConcurrencyKey {
    /// Render a group template with `{workflow}` and `{ref}` placeholders
    pub fn render(template: &str, workflow: &str, git_ref: &str) -> Self {
        ConcurrencyKey(
            template
                .replace("{workflow}", workflow)
                .replace("{ref}", git_ref),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConcurrencyKey {
    fn from(s: &str) -> Self {
        ConcurrencyKey(s.to_string())
    }
}

impl fmt::Display for ConcurrencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
