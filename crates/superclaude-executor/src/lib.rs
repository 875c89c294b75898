//! The command executor: the one component that sees the whole engine.
//!
//! Wires the parser, agent selection, model routing, validation,
//! scoring, the agentic loop, worktrees, and telemetry into a single
//! deterministic state machine per run.

mod executor;
mod extraction;
mod improver;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use executor::{Executor, clamp_requested_iterations};
pub use extraction::{FileBlock, apply_file_blocks, extract_file_blocks};
pub use types::{ExecuteRequest, ExecuteResult, Outcome, RunState, causes};
