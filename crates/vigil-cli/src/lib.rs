//! Vigil CLI - Scenario runner and audit tools for the accumulator registry
//!
//! The `vigil` binary drives the registry and governance state machines from
//! scripted scenarios, replays exported event logs and helps operators build
//! proposals (accumulator digests, device keys).

pub mod commands;
pub mod scenario;

pub use commands::*;
pub use scenario::{Scenario, ScenarioReport, ScenarioRunner, Step, StepOutcome};
