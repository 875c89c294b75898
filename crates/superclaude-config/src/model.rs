//! Configuration data model.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::limits;

/// Where a configuration value came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    ConfigFile(Utf8PathBuf),
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::ConfigFile(path) => write!(f, "config file ({path})"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// Effective engine configuration after discovery and clamping.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub providers: BTreeMap<String, ProviderSection>,
    pub tiers: BTreeMap<String, Vec<ModelEntry>>,
    pub selection: SelectionSection,
    pub quality: QualitySection,
    pub validation: ValidationSection,
    pub security: SecuritySection,
    pub telemetry: TelemetrySection,
    /// Per-key provenance, retained for `doctor` output.
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[engine]`: iteration budget and deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Iteration budget for the agentic loop; clamped to the hard ceiling.
    pub max_iterations: Option<u32>,
    pub provider_call_deadline_secs: Option<u64>,
    pub consensus_deadline_secs: Option<u64>,
    pub stage_deadline_secs: Option<u64>,
    pub iteration_deadline_secs: Option<u64>,
    pub run_deadline_secs: Option<u64>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: None,
            provider_call_deadline_secs: None,
            consensus_deadline_secs: None,
            stage_deadline_secs: None,
            iteration_deadline_secs: None,
            run_deadline_secs: None,
        }
    }
}

/// Fully resolved deadlines for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub provider_call: Duration,
    pub consensus: Duration,
    pub stage: Duration,
    pub iteration: Duration,
    pub run: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            provider_call: limits::DEFAULT_PROVIDER_CALL_DEADLINE,
            consensus: limits::DEFAULT_CONSENSUS_DEADLINE,
            stage: limits::DEFAULT_STAGE_DEADLINE,
            iteration: limits::DEFAULT_ITERATION_DEADLINE,
            run: limits::DEFAULT_RUN_DEADLINE,
        }
    }
}

impl EngineSection {
    /// Resolve the deadline table, clamping every value to its hard cap.
    #[must_use]
    pub fn deadlines(&self) -> Deadlines {
        let pick = |secs: Option<u64>, default: Duration, cap: Duration| match secs {
            Some(s) => limits::clamp_deadline(Duration::from_secs(s), cap),
            None => default,
        };

        Deadlines {
            provider_call: pick(
                self.provider_call_deadline_secs,
                limits::DEFAULT_PROVIDER_CALL_DEADLINE,
                limits::MAX_PROVIDER_CALL_DEADLINE,
            ),
            consensus: pick(
                self.consensus_deadline_secs,
                limits::DEFAULT_CONSENSUS_DEADLINE,
                limits::MAX_CONSENSUS_DEADLINE,
            ),
            stage: pick(
                self.stage_deadline_secs,
                limits::DEFAULT_STAGE_DEADLINE,
                limits::MAX_STAGE_DEADLINE,
            ),
            iteration: pick(
                self.iteration_deadline_secs,
                limits::DEFAULT_ITERATION_DEADLINE,
                limits::MAX_ITERATION_DEADLINE,
            ),
            run: pick(
                self.run_deadline_secs,
                limits::DEFAULT_RUN_DEADLINE,
                limits::MAX_RUN_DEADLINE,
            ),
        }
    }

    /// Effective iteration budget, after clamping.
    #[must_use]
    pub fn effective_max_iterations(&self) -> u32 {
        limits::clamp_iterations(self.max_iterations.unwrap_or(limits::DEFAULT_MAX_ITERATIONS))
    }
}

/// `[providers.<name>]`: one block per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults to
    /// `<PROVIDER>_API_KEY` when absent.
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// One model within a tier. Mirrors the router's descriptor fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: String,
    pub model_id: String,
    pub max_context_tokens: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub priority: u32,
    #[serde(default)]
    pub cost_hint: Option<f64>,
}

/// `[selection]`: agent selector weights and threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionSection {
    pub trigger_weight: f64,
    pub category_weight: f64,
    pub description_weight: f64,
    pub tools_weight: f64,
    pub min_score: f64,
    /// Registry cache ceiling before LRU eviction.
    pub cache_ceiling: usize,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self {
            trigger_weight: 0.35,
            category_weight: 0.25,
            description_weight: 0.20,
            tools_weight: 0.20,
            min_score: 0.60,
            cache_ceiling: 256,
        }
    }
}

/// `[quality]`: dimension weights. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySection {
    pub correctness: f64,
    pub completeness: f64,
    pub performance: f64,
    pub maintainability: f64,
    pub security: f64,
    pub scalability: f64,
    pub testability: f64,
    pub external_review: f64,
    pub usability: f64,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            correctness: 0.25,
            completeness: 0.20,
            performance: 0.10,
            maintainability: 0.10,
            security: 0.10,
            scalability: 0.10,
            testability: 0.10,
            external_review: 0.10,
            usability: 0.05,
        }
    }
}

impl QualitySection {
    /// Sum of all weights; valid configurations sum to 1.0 (± epsilon).
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.correctness
            + self.completeness
            + self.performance
            + self.maintainability
            + self.security
            + self.scalability
            + self.testability
            + self.external_review
            + self.usability
    }
}

/// `[validation]`: external tool hooks for pipeline stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Lint command, e.g. `cargo clippy -- -D warnings`.
    pub lint_command: Option<String>,
    /// Test runner command, e.g. `cargo test`.
    pub test_command: Option<String>,
    /// Build command, e.g. `cargo build`.
    pub build_command: Option<String>,
    /// Type-check command when the toolchain separates it from build.
    pub typecheck_command: Option<String>,
    /// Stage names to treat as optional (never short-circuit).
    #[serde(default)]
    pub optional_stages: Vec<String>,
}

/// `[security]`: redaction pattern extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default)]
    pub extra_secret_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_secret_patterns: Vec<String>,
}

/// `[telemetry]`: sink tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Base directory override; `ENGINE_METRICS_DIR` wins over this.
    pub metrics_dir: Option<String>,
    /// Bounded event buffer capacity.
    pub buffer_cap: usize,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            metrics_dir: None,
            buffer_cap: 1024,
        }
    }
}

impl EngineConfig {
    /// Built-in defaults with the compiled-in tier table.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            engine: EngineSection::default(),
            providers: default_providers(),
            tiers: default_tiers(),
            selection: SelectionSection::default(),
            quality: QualitySection::default(),
            validation: ValidationSection::default(),
            security: SecuritySection::default(),
            telemetry: TelemetrySection::default(),
            source_attribution: HashMap::new(),
        }
    }

    /// Record where a key's value came from.
    pub fn attribute(&mut self, key: &str, source: ConfigSource) {
        self.source_attribution.insert(key.to_string(), source);
    }
}

/// Compiled-in provider table. Keys double as the `<PROVIDER>_API_KEY` stems.
fn default_providers() -> BTreeMap<String, ProviderSection> {
    let mut providers = BTreeMap::new();
    for name in ["anthropic", "openai", "google", "xai"] {
        providers.insert(name.to_string(), ProviderSection::default());
    }
    providers
}

/// Compiled-in tier table, highest priority first within each tier.
fn default_tiers() -> BTreeMap<String, Vec<ModelEntry>> {
    let entry = |provider: &str, model_id: &str, ctx: u64, caps: &[&str], priority: u32| {
        ModelEntry {
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            max_context_tokens: ctx,
            capabilities: caps.iter().map(|c| (*c).to_string()).collect(),
            priority,
            cost_hint: None,
        }
    };

    let mut tiers = BTreeMap::new();
    tiers.insert(
        "deep_thinking".to_string(),
        vec![
            entry("anthropic", "claude-opus-4", 200_000, &["thinking"], 30),
            entry("openai", "o3", 200_000, &["thinking"], 20),
            entry("xai", "grok-4", 131_072, &["thinking"], 10),
        ],
    );
    tiers.insert(
        "long_context".to_string(),
        vec![
            entry("google", "gemini-2.5-pro", 1_048_576, &["long_context", "vision"], 30),
            entry("anthropic", "claude-sonnet-4", 200_000, &["long_context"], 20),
        ],
    );
    tiers.insert(
        "fast_iteration".to_string(),
        vec![
            entry("anthropic", "claude-haiku-4", 200_000, &["fast"], 30),
            entry("google", "gemini-2.5-flash", 1_048_576, &["fast", "long_context"], 20),
            entry("openai", "gpt-4.1-mini", 1_000_000, &["fast", "long_context"], 10),
        ],
    );
    tiers.insert(
        "fallback".to_string(),
        vec![
            entry("openai", "gpt-4.1", 1_000_000, &["long_context"], 30),
            entry("anthropic", "claude-sonnet-4", 200_000, &[], 20),
            entry("google", "gemini-2.5-flash", 1_048_576, &["fast"], 10),
        ],
    );
    tiers
}

#[cfg(any(test, feature = "test-utils"))]
impl EngineConfig {
    /// Minimal configuration for unit tests that skip discovery.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quality_weights_sum_to_one() {
        let q = QualitySection::default();
        assert!((q.weight_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_selection_weights_sum_to_one() {
        let s = SelectionSection::default();
        let sum = s.trigger_weight + s.category_weight + s.description_weight + s.tools_weight;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn deadlines_clamp_to_hard_caps() {
        let section = EngineSection {
            stage_deadline_secs: Some(999_999),
            run_deadline_secs: Some(999_999),
            ..EngineSection::default()
        };
        let deadlines = section.deadlines();
        assert_eq!(deadlines.stage, limits::MAX_STAGE_DEADLINE);
        assert_eq!(deadlines.run, limits::MAX_RUN_DEADLINE);
        // Untouched knobs keep defaults
        assert_eq!(deadlines.provider_call, limits::DEFAULT_PROVIDER_CALL_DEADLINE);
    }

    #[test]
    fn iteration_budget_clamps_to_hard_ceiling() {
        let section = EngineSection {
            max_iterations: Some(50),
            ..EngineSection::default()
        };
        assert_eq!(section.effective_max_iterations(), limits::HARD_MAX_ITERATIONS);

        let section = EngineSection::default();
        assert_eq!(
            section.effective_max_iterations(),
            limits::DEFAULT_MAX_ITERATIONS
        );
    }

    #[test]
    fn default_tiers_cover_required_set() {
        let config = EngineConfig::defaults();
        for tier in ["deep_thinking", "long_context", "fast_iteration", "fallback"] {
            assert!(config.tiers.contains_key(tier), "missing tier {tier}");
            assert!(!config.tiers[tier].is_empty());
        }
    }
}
