//! The quality scorer.
//!
//! Per-dimension heuristics feed a weighted base score; deterministic caps
//! bound it from above; bonuses (clamped to +25) reward verifiable
//! hygiene. `final = clamp(min(base, caps) + bonuses, 0, 100)`.

use std::collections::BTreeMap;

use strum::IntoEnumIterator;
use tracing::debug;

use superclaude_config::QualitySection;

use crate::types::{Band, QualityAssessment, QualityDimension, Signals};

/// Bonus total can never exceed this.
const MAX_BONUS: f64 = 25.0;

/// Caps triggered by deterministic signals.
const CAP_SECURITY_CRITICAL: f64 = 30.0;
const CAP_SECURITY_HIGH: f64 = 65.0;
const CAP_TEST_FAILURE_SEVERE: f64 = 40.0;
const CAP_TEST_FAILURE_MODERATE: f64 = 50.0;
const CAP_BUILD_FAILURE: f64 = 45.0;

/// Per-dimension improvement thresholds; scores below these are listed in
/// `improvements_needed`.
fn threshold(dimension: QualityDimension) -> f64 {
    match dimension {
        QualityDimension::Correctness => 75.0,
        QualityDimension::Security => 80.0,
        QualityDimension::Completeness => 70.0,
        QualityDimension::Testability => 65.0,
        _ => 60.0,
    }
}

/// Pure scorer over `(signals, external_review)`.
pub struct QualityScorer {
    weights: QualitySection,
}

impl QualityScorer {
    #[must_use]
    pub fn new(weights: QualitySection) -> Self {
        Self { weights }
    }

    /// Score one iteration's evidence.
    ///
    /// `external_review` is the collaborator verdict in [0,100] when one
    /// was available; omitting it redistributes that dimension's weight
    /// proportionally and marks the assessment degraded.
    #[must_use]
    pub fn score(&self, signals: &Signals, external_review: Option<f64>) -> QualityAssessment {
        let mut scores: BTreeMap<QualityDimension, f64> = BTreeMap::new();
        for dimension in QualityDimension::iter() {
            if dimension == QualityDimension::ExternalReview && external_review.is_none() {
                continue;
            }
            scores.insert(dimension, self.dimension_score(dimension, signals, external_review));
        }

        let weighted_score = self.weighted(&scores, external_review.is_none());
        let cap_applied = self.cap_for(signals);
        let bonus_applied = self.bonus_for(signals);

        // Caps bind after bonuses: a capped run can never be rescued by
        // hygiene points
        let boosted = weighted_score + bonus_applied;
        let final_score = match cap_applied {
            Some(cap) => boosted.min(cap),
            None => boosted,
        }
        .clamp(0.0, 100.0);

        let mut improvements_needed: Vec<String> = scores
            .iter()
            .filter(|(d, s)| **s < threshold(**d))
            .map(|(d, s)| format!("{}: {:.0} below target {:.0}", d.as_str(), s, threshold(*d)))
            .collect();
        improvements_needed.sort();

        debug!(
            weighted = weighted_score,
            ?cap_applied,
            bonus = bonus_applied,
            final_score,
            "scored iteration"
        );

        QualityAssessment {
            scores_by_dimension: scores,
            weighted_score,
            cap_applied,
            bonus_applied,
            final_score,
            band: Band::for_score(final_score),
            improvements_needed,
            degraded: external_review.is_none(),
        }
    }

    fn dimension_score(
        &self,
        dimension: QualityDimension,
        signals: &Signals,
        external_review: Option<f64>,
    ) -> f64 {
        let score = match dimension {
            QualityDimension::Correctness => {
                if signals.build_pass == Some(false) {
                    25.0
                } else if signals.tests.total > 0 {
                    100.0 * (1.0 - signals.tests.failure_rate())
                } else {
                    70.0
                }
            }
            QualityDimension::Completeness => {
                if signals.files_changed > 0 {
                    80.0 + if signals.tests_changed > 0 { 15.0 } else { 0.0 }
                } else {
                    30.0
                }
            }
            QualityDimension::Performance => 75.0,
            QualityDimension::Maintainability => match signals.lint_clean {
                Some(true) => 85.0,
                Some(false) => 55.0,
                None => 70.0,
            },
            QualityDimension::Security => {
                if signals.security.critical > 0 {
                    10.0
                } else if signals.security.high > 0 {
                    40.0
                } else {
                    90.0
                }
            }
            QualityDimension::Scalability => {
                70.0 + if signals.typecheck_pass == Some(true) { 5.0 } else { 0.0 }
            }
            QualityDimension::Testability => {
                let base = if signals.tests.total == 0 {
                    30.0
                } else {
                    match signals.tests.coverage_percent {
                        Some(c) if c >= 80.0 => 95.0,
                        Some(c) if c >= 50.0 => 75.0,
                        _ => 60.0,
                    }
                };
                base + if signals.tests_changed > 0 { 5.0 } else { 0.0 }
            }
            QualityDimension::ExternalReview => external_review.unwrap_or(0.0),
            QualityDimension::Usability => 70.0,
        };
        score.clamp(0.0, 100.0)
    }

    /// Weighted sum. When the external review dimension is absent its
    /// weight is redistributed proportionally across the rest.
    fn weighted(&self, scores: &BTreeMap<QualityDimension, f64>, review_absent: bool) -> f64 {
        let weight_of = |d: QualityDimension| -> f64 {
            match d {
                QualityDimension::Correctness => self.weights.correctness,
                QualityDimension::Completeness => self.weights.completeness,
                QualityDimension::Performance => self.weights.performance,
                QualityDimension::Maintainability => self.weights.maintainability,
                QualityDimension::Security => self.weights.security,
                QualityDimension::Scalability => self.weights.scalability,
                QualityDimension::Testability => self.weights.testability,
                QualityDimension::ExternalReview => self.weights.external_review,
                QualityDimension::Usability => self.weights.usability,
            }
        };

        let denominator = if review_absent {
            1.0 - self.weights.external_review
        } else {
            1.0
        };
        if denominator <= 0.0 {
            return 0.0;
        }

        scores
            .iter()
            .map(|(d, s)| weight_of(*d) / denominator * s)
            .sum()
    }

    /// The binding cap, if any. Multiple triggered caps bind at the
    /// smallest value.
    fn cap_for(&self, signals: &Signals) -> Option<f64> {
        let mut caps = Vec::new();

        if signals.security.critical > 0 {
            caps.push(CAP_SECURITY_CRITICAL);
        } else if signals.security.high > 0 {
            caps.push(CAP_SECURITY_HIGH);
        }

        let failure_rate = signals.tests.failure_rate();
        if failure_rate > 0.5 {
            caps.push(CAP_TEST_FAILURE_SEVERE);
        } else if failure_rate > 0.2 {
            caps.push(CAP_TEST_FAILURE_MODERATE);
        }

        if signals.build_pass == Some(false) {
            caps.push(CAP_BUILD_FAILURE);
        }

        caps.into_iter().fold(None, |acc, cap| {
            Some(acc.map_or(cap, |a: f64| a.min(cap)))
        })
    }

    /// Deterministic bonuses, summed and clamped to +25.
    fn bonus_for(&self, signals: &Signals) -> f64 {
        let mut bonus: f64 = 0.0;
        if signals.tests.coverage_percent.is_some_and(|c| c >= 80.0) {
            bonus += 10.0;
        }
        if signals.lint_clean == Some(true) {
            bonus += 5.0;
        }
        if signals.typecheck_pass == Some(true) {
            bonus += 5.0;
        }
        if signals.tests.all_passed() {
            bonus += 5.0;
        }
        if signals.security.clean() {
            bonus += 5.0;
        }
        bonus.min(MAX_BONUS)
    }
}
