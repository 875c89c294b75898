//! The staged validation pipeline.
//!
//! Five ordered stages, `syntax → security → style → tests → performance`,
//! each collecting findings against the working tree (or worktree).
//! A fatal result from a required stage skips the remaining stages, but
//! the pipeline always completes and reports what was skipped: collect as
//! much as possible, stop the bleeding on fatal. Stages are idempotent and
//! never mutate the tree they inspect.

mod pipeline;
mod stages;
mod tools;
mod types;

pub use pipeline::{Pipeline, PipelineReport};
pub use stages::{
    PerformanceStage, SecurityStage, Stage, StyleStage, SyntaxStage, TestsStage,
};
pub use types::{CollectedChecks, Finding, Severity, StageContext, StageResult};

pub use superclaude_util::error::PipelineError;

/// Stage execution order.
pub const STAGE_ORDER: [&str; 5] = ["syntax", "security", "style", "tests", "performance"];
