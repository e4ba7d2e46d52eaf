//! Core domain models
//!
//! This module defines the workflow configuration, triggers, runs and
//! stages, and their runtime state.

pub mod config;
pub mod context;
pub mod run;
pub mod stage;
pub mod state;
pub mod trigger;

pub use context::*;
pub use run::*;
pub use stage::*;
pub use state::*;
pub use trigger::*;
