//! Scoring data shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// The nine quality dimensions. Weights come from configuration and sum
/// to 1.0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Correctness,
    Completeness,
    Performance,
    Maintainability,
    Security,
    Scalability,
    Testability,
    ExternalReview,
    Usability,
}

impl QualityDimension {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correctness => "correctness",
            Self::Completeness => "completeness",
            Self::Performance => "performance",
            Self::Maintainability => "maintainability",
            Self::Security => "security",
            Self::Scalability => "scalability",
            Self::Testability => "testability",
            Self::ExternalReview => "external_review",
            Self::Usability => "usability",
        }
    }
}

/// Test facts observed after execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSignals {
    pub total: u64,
    pub failed: u64,
    pub coverage_percent: Option<f64>,
}

impl TestSignals {
    /// Failure rate in [0,1]; 0 when no tests ran.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// Security facts from the validation pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySignals {
    pub critical: u64,
    pub high: u64,
}

impl SecuritySignals {
    #[must_use]
    pub fn clean(&self) -> bool {
        self.critical == 0 && self.high == 0
    }
}

/// Deterministic facts derived from the environment after execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub tests: TestSignals,
    pub lint_clean: Option<bool>,
    pub typecheck_pass: Option<bool>,
    pub build_pass: Option<bool>,
    pub security: SecuritySignals,
    pub files_changed: u64,
    pub tests_changed: u64,
}

/// Coarse quality classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    ProductionReady,
    NeedsAttention,
    Iterate,
}

impl Band {
    /// Band thresholds: ≥90 production-ready, 75–89 needs attention,
    /// below 75 iterate.
    #[must_use]
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::ProductionReady
        } else if score >= 75.0 {
            Self::NeedsAttention
        } else {
            Self::Iterate
        }
    }
}

/// The scorer's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub scores_by_dimension: BTreeMap<QualityDimension, f64>,
    /// Weighted base score before caps and bonuses.
    pub weighted_score: f64,
    /// The binding cap, when any deterministic cap triggered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_applied: Option<f64>,
    /// Total bonus applied (clamped to +25).
    pub bonus_applied: f64,
    pub final_score: f64,
    pub band: Band,
    pub improvements_needed: Vec<String>,
    /// True when the external review dimension was unavailable and its
    /// weight was redistributed.
    pub degraded: bool,
}
