//! SuperClaude engine facade.
//!
//! The engine is a single-process orchestrator: parse a `/ns:name`
//! invocation, select an agent persona, route model calls (optionally by
//! consensus), validate the produced artifacts through staged checks,
//! score them with deterministic safety grounding, iterate a bounded
//! improvement loop, and leave an auditable evidence trail behind.
//!
//! This crate re-exports the workspace members under stable module names;
//! the member crates are the implementation.

pub use superclaude_agents as agents;
pub use superclaude_command as command;
pub use superclaude_config as config;
pub use superclaude_executor as executor;
pub use superclaude_providers as providers;
pub use superclaude_quality as quality;
pub use superclaude_redaction as redaction;
pub use superclaude_router as router;
pub use superclaude_telemetry as telemetry;
pub use superclaude_util as util;
pub use superclaude_validation as validation;
pub use superclaude_worktree as worktree;

pub use superclaude_executor::{ExecuteRequest, ExecuteResult, Executor, Outcome};
pub use superclaude_util::exit_codes::ExitCode;
