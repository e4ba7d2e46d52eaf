//! Scenario-based tests for sitepipe

#[path = "../helpers/mod.rs"]
mod helpers;

mod failure_handling;
mod manual_inputs;
mod publish_flow;
mod supersede;
