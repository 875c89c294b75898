//! Quality scoring and the agentic improvement loop.
//!
//! Scoring is pure: for a fixed set of signals and an optional external
//! review, the same assessment comes out every time. Deterministic caps
//! (security findings, test failures, build breakage) bound the score from
//! above no matter how well the weighted dimensions read; bonuses are
//! clamped and can never mask a cap.
//!
//! The loop re-invokes an improver until quality is met or a termination
//! rule fires. `HARD_MAX_ITERATIONS` is an anti-runaway guarantee: no
//! configuration path raises it.

mod agentic;
mod scorer;
mod types;

pub use agentic::{
    AgenticLoop, FeedbackPacket, Improver, IterationOutcome, IterationRecord, LoopConfig,
    LoopResult, TerminationReason,
};
pub use scorer::QualityScorer;
pub use types::{Band, QualityAssessment, QualityDimension, SecuritySignals, Signals, TestSignals};
