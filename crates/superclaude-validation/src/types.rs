//! Pipeline data shapes.

use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use superclaude_config::ValidationSection;

/// Severity of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// One reported issue from a validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub stage: String,
    pub severity: Severity,
    /// Fatal findings from a required stage stop the remaining stages.
    pub fatal: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Finding {
    #[must_use]
    pub fn new(stage: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            severity,
            fatal: false,
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    #[must_use]
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub passed: bool,
    pub fatal_encountered: bool,
    pub findings: Vec<Finding>,
    /// Path of the stage's evidence file once written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<Utf8PathBuf>,
    /// Stage-specific measurements consumed by signal collection.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metrics: serde_json::Value,
}

impl StageResult {
    /// Build a result from findings: failed when anything medium or worse
    /// was found, fatal when any finding is marked fatal.
    #[must_use]
    pub fn from_findings(stage: &str, findings: Vec<Finding>) -> Self {
        let passed = !findings.iter().any(|f| f.severity >= Severity::Medium);
        let fatal_encountered = findings.iter().any(|f| f.fatal);
        Self {
            stage: stage.to_string(),
            passed,
            fatal_encountered,
            findings,
            evidence_ref: None,
            metrics: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = metrics;
        self
    }

    /// Findings at a given severity.
    #[must_use]
    pub fn count_at(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// What a stage gets to work with.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Root of the tree under validation (worktree when one is open).
    pub root: Utf8PathBuf,
    /// External tool hooks from configuration.
    pub tools: ValidationSection,
    /// Whether the command expects tests to exist or change.
    pub expects_tests: bool,
    /// Per-stage deadline.
    pub deadline: Duration,
}

impl StageContext {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, tools: ValidationSection) -> Self {
        Self {
            root: root.into(),
            tools,
            expects_tests: false,
            deadline: superclaude_config::limits::DEFAULT_STAGE_DEADLINE,
        }
    }
}

/// Deterministic check results distilled from a pipeline run, consumed by
/// the quality scorer's signal collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedChecks {
    pub tests_total: u64,
    pub tests_failed: u64,
    pub coverage_percent: Option<f64>,
    pub lint_clean: Option<bool>,
    pub typecheck_pass: Option<bool>,
    pub build_pass: Option<bool>,
    pub security_critical: u64,
    pub security_high: u64,
}
