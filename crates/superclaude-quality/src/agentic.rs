//! The bounded agentic improvement loop.
//!
//! Per iteration: EXECUTE → COLLECT_SIGNALS → SCORE → DECIDE. The decide
//! step checks, in order: quality target, iteration ceiling, insufficient
//! movement, oscillation, stagnation, and the wall-clock deadline. The
//! hard iteration ceiling terminates the loop even when scores are still
//! improving.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use superclaude_config::limits::HARD_MAX_ITERATIONS;

use crate::scorer::QualityScorer;
use crate::types::{QualityAssessment, Signals};

/// Score must reach this for QUALITY_MET.
pub const QUALITY_TARGET: f64 = 90.0;

/// Minimum absolute score movement between successive iterations.
pub const MIN_IMPROVEMENT: f64 = 5.0;

/// Number of successive deltas inspected for oscillation (needs one more
/// score than this to evaluate).
pub const OSCILLATION_WINDOW: usize = 3;

/// Maximum spread across the window that still counts as stagnation, and
/// the per-delta threshold for oscillation.
pub const STAGNATION_DELTA: f64 = 2.0;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    QualityMet,
    MaxIterations,
    InsufficientImprovement,
    Oscillation,
    Stagnation,
    Timeout,
    Error,
    HumanEscalation,
}

/// Feedback handed to the improver for the next iteration. Appended to the
/// improver's context, never replacing the original task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPacket {
    pub score: f64,
    pub dimension_breakdown: std::collections::BTreeMap<crate::types::QualityDimension, f64>,
    pub improvements_needed: Vec<String>,
    /// Findings first seen in the iteration that produced this packet.
    pub new_findings: Vec<String>,
}

/// What one improver pass produced.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub signals: Signals,
    /// External review verdict in [0,100] when a collaborator was
    /// reachable this iteration.
    pub external_review: Option<f64>,
    /// Digest of the artifacts produced; `None` when the pass produced
    /// nothing inspectable.
    pub output_digest: Option<String>,
    /// Findings newly observed this iteration.
    pub new_findings: Vec<String>,
    /// True when this pass ran with degraded collaborators.
    pub degraded: bool,
}

/// The thing the loop re-invokes. In production this is the executor's
/// re-delegation to the selected agent; tests supply scripted sequences.
#[async_trait]
pub trait Improver: Send + Sync {
    async fn run_iteration(
        &self,
        index: u32,
        feedback: Option<&FeedbackPacket>,
    ) -> anyhow::Result<IterationOutcome>;
}

/// One iteration's record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub index: u32,
    pub started_at: String,
    pub finished_at: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_in: Option<FeedbackPacket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_digest: Option<String>,
    pub assessment: QualityAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
    pub degraded: bool,
}

/// The loop's result: the best iteration plus the full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub best_record: IterationRecord,
    pub history: Vec<IterationRecord>,
    pub terminated_by: TerminationReason,
    /// Error text when `terminated_by` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Loop knobs. `max_iterations` is clamped to the hard ceiling at
/// construction and again inside the loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub quality_target: f64,
    pub min_improvement: f64,
    pub deadline: Duration,
    /// Require a fresh artifact digest every iteration. Commands that must
    /// produce evidence may not loop on plan-only responses.
    pub require_fresh_artifacts: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: superclaude_config::limits::DEFAULT_MAX_ITERATIONS,
            quality_target: QUALITY_TARGET,
            min_improvement: MIN_IMPROVEMENT,
            deadline: superclaude_config::limits::DEFAULT_ITERATION_DEADLINE,
            require_fresh_artifacts: false,
        }
    }
}

/// The loop driver.
pub struct AgenticLoop {
    scorer: QualityScorer,
    config: LoopConfig,
}

impl AgenticLoop {
    #[must_use]
    pub fn new(scorer: QualityScorer, config: LoopConfig) -> Self {
        Self { scorer, config }
    }

    /// Drive the improver until quality is met or a termination rule fires.
    ///
    /// Iterations are strictly sequential; iteration `i+1` observes the
    /// full effects of iteration `i` through its feedback packet.
    pub async fn run(&self, improver: &dyn Improver, agent_id: &str) -> LoopResult {
        let ceiling = self.config.max_iterations.min(HARD_MAX_ITERATIONS);
        let started = Instant::now();

        let mut history: Vec<IterationRecord> = Vec::new();
        let mut scores: Vec<f64> = Vec::new();
        let mut feedback: Option<FeedbackPacket> = None;
        let mut previous_digest: Option<String> = None;

        loop {
            let index = history.len() as u32 + 1;
            let started_at = now();

            let outcome = match improver.run_iteration(index, feedback.as_ref()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(iteration = index, error = %e, "improver raised, terminating loop");
                    return self.finish_with_error(history, e.to_string());
                }
            };

            let assessment = self
                .scorer
                .score(&outcome.signals, outcome.external_review);
            let score = assessment.final_score;
            scores.push(score);

            let mut record = IterationRecord {
                index,
                started_at,
                finished_at: now(),
                agent_id: agent_id.to_string(),
                feedback_in: feedback.clone(),
                output_digest: outcome.output_digest.clone(),
                assessment: assessment.clone(),
                termination_reason: None,
                degraded: outcome.degraded || assessment.degraded,
            };

            info!(iteration = index, score, "iteration scored");

            // DECIDE
            let stale_artifacts = self.config.require_fresh_artifacts
                && (outcome.output_digest.is_none()
                    || outcome.output_digest == previous_digest);
            let reason = self.decide(&scores, index, ceiling, started, stale_artifacts);
            previous_digest = outcome.output_digest;

            match reason {
                Some(reason) => {
                    record.termination_reason = Some(reason);
                    history.push(record);
                    return self.finish(history, reason);
                }
                None => {
                    // BUILD_FEEDBACK for the next pass
                    feedback = Some(FeedbackPacket {
                        score,
                        dimension_breakdown: assessment.scores_by_dimension.clone(),
                        improvements_needed: assessment.improvements_needed.clone(),
                        new_findings: outcome.new_findings.clone(),
                    });
                    history.push(record);
                }
            }
        }
    }

    /// Termination rules, in specification order.
    fn decide(
        &self,
        scores: &[f64],
        iterations: u32,
        ceiling: u32,
        started: Instant,
        stale_artifacts: bool,
    ) -> Option<TerminationReason> {
        let score = *scores.last().expect("decide requires a score");

        if score >= self.config.quality_target {
            return Some(TerminationReason::QualityMet);
        }
        if iterations >= ceiling || iterations >= HARD_MAX_ITERATIONS {
            return Some(TerminationReason::MaxIterations);
        }
        if stale_artifacts {
            // Plan-only iterations cannot make evidence-backed progress
            return Some(TerminationReason::InsufficientImprovement);
        }
        // Movement is judged once two full deltas exist; a single slow step
        // right after the first feedback round is not yet a verdict
        if scores.len() >= 3 {
            let last_improvement = (scores[scores.len() - 1] - scores[scores.len() - 2]).abs();
            if last_improvement < self.config.min_improvement && oscillating(scores) {
                // Tiny alternating moves read as both; oscillation is the
                // more specific diagnosis
                return Some(TerminationReason::Oscillation);
            }
            if last_improvement < self.config.min_improvement {
                return Some(TerminationReason::InsufficientImprovement);
            }
        }
        if oscillating(scores) {
            return Some(TerminationReason::Oscillation);
        }
        if stagnating(scores) {
            return Some(TerminationReason::Stagnation);
        }
        if started.elapsed() >= self.config.deadline {
            return Some(TerminationReason::Timeout);
        }
        None
    }

    fn finish(&self, history: Vec<IterationRecord>, reason: TerminationReason) -> LoopResult {
        let best_record = best_of(&history).expect("loop ran at least one iteration");
        LoopResult {
            best_record,
            history,
            terminated_by: reason,
            error: None,
        }
    }

    fn finish_with_error(&self, history: Vec<IterationRecord>, error: String) -> LoopResult {
        let best_record = match best_of(&history) {
            Some(best) => best,
            None => {
                // The improver failed before producing anything scoreable
                let assessment = self.scorer.score(&Signals::default(), None);
                IterationRecord {
                    index: 0,
                    started_at: now(),
                    finished_at: now(),
                    agent_id: String::new(),
                    feedback_in: None,
                    output_digest: None,
                    assessment,
                    termination_reason: Some(TerminationReason::Error),
                    degraded: true,
                }
            }
        };
        LoopResult {
            best_record,
            history,
            terminated_by: TerminationReason::Error,
            error: Some(error),
        }
    }
}

fn best_of(history: &[IterationRecord]) -> Option<IterationRecord> {
    history
        .iter()
        .max_by(|a, b| {
            a.assessment
                .final_score
                .partial_cmp(&b.assessment.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

/// Oscillation: over the last `OSCILLATION_WINDOW` deltas, every delta
/// exceeds `STAGNATION_DELTA` in magnitude and successive deltas alternate
/// sign.
fn oscillating(scores: &[f64]) -> bool {
    if scores.len() < OSCILLATION_WINDOW + 1 {
        return false;
    }
    let window = &scores[scores.len() - (OSCILLATION_WINDOW + 1)..];
    let deltas: Vec<f64> = window.windows(2).map(|p| p[1] - p[0]).collect();

    if deltas.iter().any(|d| d.abs() <= STAGNATION_DELTA) {
        return false;
    }
    deltas
        .windows(2)
        .all(|pair| (pair[0] > 0.0) != (pair[1] > 0.0))
}

/// Stagnation: over the last `OSCILLATION_WINDOW + 1` scores, the spread
/// between best and worst stays within `STAGNATION_DELTA`.
fn stagnating(scores: &[f64]) -> bool {
    if scores.len() < OSCILLATION_WINDOW + 1 {
        return false;
    }
    let window = &scores[scores.len() - (OSCILLATION_WINDOW + 1)..];
    let max = window.iter().cloned().fold(f64::MIN, f64::max);
    let min = window.iter().cloned().fold(f64::MAX, f64::min);
    (max - min) <= STAGNATION_DELTA
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}
