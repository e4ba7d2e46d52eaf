//! Stage domain model

use crate::core::state::StageState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Materialize the source tree with submodules and full history
    Checkout,
    /// Run the static-site generator
    Build,
    /// Push the generated output to the target branch
    Publish,
}

impl StageKind {
    /// All stages in the order a run executes them
    pub const ALL: [StageKind; 3] = [StageKind::Checkout, StageKind::Build, StageKind::Publish];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Checkout => "checkout",
            StageKind::Build => "build",
            StageKind::Publish => "publish",
        }
    }

    /// Human-readable title for headers
    pub fn title(&self) -> &'static str {
        match self {
            StageKind::Checkout => "Checkout",
            StageKind::Build => "Build",
            StageKind::Publish => "Publish",
        }
    }

    /// 1-based position in the run
    pub fn position(&self) -> usize {
        match self {
            StageKind::Checkout => 1,
            StageKind::Build => 2,
            StageKind::Publish => 3,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout" => Ok(StageKind::Checkout),
            "build" => Ok(StageKind::Build),
            "publish" => Ok(StageKind::Publish),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

/// A stage of one run together with its runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub kind: StageKind,
    pub state: StageState,
}

impl StageRecord {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            state: StageState::Pending,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.state, StageState::Succeeded { .. })
    }

    /// Whether the stage was ever started
    pub fn was_invoked(&self) -> bool {
        self.state.started_at().is_some()
    }
}
