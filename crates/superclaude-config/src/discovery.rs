//! Configuration discovery.
//!
//! Precedence: environment > config file > built-in defaults. The config
//! file is `.superclaude/config.toml`, found by walking up from the start
//! directory; the first hit wins.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use superclaude_util::error::ConfigError;

use crate::limits;
use crate::model::{
    ConfigSource, EngineConfig, EngineSection, ModelEntry, ProviderSection, QualitySection,
    SecuritySection, SelectionSection, TelemetrySection, ValidationSection,
};

/// Relative path of the config file under each candidate directory.
const CONFIG_RELATIVE_PATH: &str = ".superclaude/config.toml";

/// TOML configuration file structure. Every section is optional; missing
/// sections keep their defaults.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    engine: Option<EngineSection>,
    providers: Option<BTreeMap<String, ProviderSection>>,
    tiers: Option<BTreeMap<String, Vec<ModelEntry>>>,
    selection: Option<SelectionSection>,
    quality: Option<QualitySection>,
    validation: Option<ValidationSection>,
    security: Option<SecuritySection>,
    telemetry: Option<TelemetrySection>,
}

impl EngineConfig {
    /// Discover and load configuration starting from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error when a discovered config file cannot be read or
    /// parsed, or when a parsed section fails validation. A missing config
    /// file is not an error.
    pub fn discover_from(start_dir: &Path) -> Result<Self> {
        let mut config = Self::defaults();

        if let Some(path) = discover_config_file(start_dir) {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let file: TomlConfig = toml::from_str(&content).map_err(|e| ConfigError::InvalidFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

            let source = ConfigSource::ConfigFile(
                Utf8PathBuf::from_path_buf(path.clone())
                    .unwrap_or_else(|p| Utf8PathBuf::from(p.display().to_string())),
            );
            config.apply_file(file, source);
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: TomlConfig, source: ConfigSource) {
        if let Some(engine) = file.engine {
            self.engine = engine;
            self.attribute("engine", source.clone());
        }
        if let Some(providers) = file.providers {
            // File entries override per-provider, not wholesale: an operator
            // configuring [providers.anthropic] keeps the other defaults
            for (name, section) in providers {
                self.providers.insert(name.clone(), section);
                self.attribute(&format!("providers.{name}"), source.clone());
            }
        }
        if let Some(tiers) = file.tiers {
            for (name, entries) in tiers {
                self.tiers.insert(name.clone(), entries);
                self.attribute(&format!("tiers.{name}"), source.clone());
            }
        }
        if let Some(selection) = file.selection {
            self.selection = selection;
            self.attribute("selection", source.clone());
        }
        if let Some(quality) = file.quality {
            self.quality = quality;
            self.attribute("quality", source.clone());
        }
        if let Some(validation) = file.validation {
            self.validation = validation;
            self.attribute("validation", source.clone());
        }
        if let Some(security) = file.security {
            self.security = security;
            self.attribute("security", source.clone());
        }
        if let Some(telemetry) = file.telemetry {
            self.telemetry = telemetry;
            self.attribute("telemetry", source);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(limits::MAX_ITERATIONS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(requested) => {
                    let clamped = limits::clamp_iterations(requested);
                    if clamped < requested {
                        warn!(
                            requested,
                            clamped,
                            "{} above the hard ceiling, clamping",
                            limits::MAX_ITERATIONS_ENV
                        );
                    }
                    self.engine.max_iterations = Some(clamped);
                    self.attribute("engine.max_iterations", ConfigSource::Environment);
                }
                Err(_) => {
                    warn!(value = %raw, "ignoring unparseable {}", limits::MAX_ITERATIONS_ENV);
                }
            }
        }

        if let Ok(dir) = std::env::var(superclaude_util::paths::METRICS_DIR_ENV)
            && !dir.trim().is_empty()
        {
            self.telemetry.metrics_dir = Some(dir);
            self.attribute("telemetry.metrics_dir", ConfigSource::Environment);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.quality.weight_sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue {
                key: "quality".to_string(),
                value: format!("dimension weights sum to {sum:.4}, expected 1.0"),
            });
        }

        let selection_sum = self.selection.trigger_weight
            + self.selection.category_weight
            + self.selection.description_weight
            + self.selection.tools_weight;
        if (selection_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidValue {
                key: "selection".to_string(),
                value: format!("selector weights sum to {selection_sum:.4}, expected 1.0"),
            });
        }

        for (tier, entries) in &self.tiers {
            for entry in entries {
                if !self.providers.contains_key(&entry.provider) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("tiers.{tier}"),
                        value: format!("unknown provider '{}'", entry.provider),
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolve the telemetry base directory for a workspace.
    #[must_use]
    pub fn telemetry_base(&self, workspace: &Utf8Path) -> Utf8PathBuf {
        // Env override is applied by paths::base_dir; the config field only
        // matters when the env var is absent
        if std::env::var(superclaude_util::paths::METRICS_DIR_ENV).is_ok() {
            return superclaude_util::paths::base_dir(workspace);
        }
        match &self.telemetry.metrics_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => superclaude_util::paths::base_dir(workspace),
        }
    }
}

/// Walk up from `start_dir` looking for `.superclaude/config.toml`.
fn discover_config_file(start_dir: &Path) -> Option<std::path::PathBuf> {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        let config_dir = dir.join(".superclaude");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::discover_from(dir.path()).unwrap();
        assert_eq!(
            config.engine.effective_max_iterations(),
            limits::DEFAULT_MAX_ITERATIONS
        );
        assert!(config.tiers.contains_key("fallback"));
    }

    #[test]
    fn config_file_discovered_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
[engine]
max_iterations = 2
stage_deadline_secs = 120
"#,
        );
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let config = EngineConfig::discover_from(&nested).unwrap();
        assert_eq!(config.engine.effective_max_iterations(), 2);
        assert_eq!(
            config.engine.deadlines().stage,
            std::time::Duration::from_secs(120)
        );
        assert!(matches!(
            config.source_attribution.get("engine"),
            Some(ConfigSource::ConfigFile(_))
        ));
    }

    #[test]
    fn file_iteration_budget_is_clamped() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
[engine]
max_iterations = 50
"#,
        );
        let config = EngineConfig::discover_from(dir.path()).unwrap();
        assert_eq!(
            config.engine.effective_max_iterations(),
            limits::HARD_MAX_ITERATIONS
        );
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        write_config(dir.path(), "this is not toml = [");
        let err = EngineConfig::discover_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("config"));
    }

    #[test]
    fn bad_quality_weights_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
[quality]
correctness = 0.9
completeness = 0.9
performance = 0.0
maintainability = 0.0
security = 0.0
scalability = 0.0
testability = 0.0
external_review = 0.0
usability = 0.0
"#,
        );
        let err = EngineConfig::discover_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("sum"));
    }

    #[test]
    fn tier_referencing_unknown_provider_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
[[tiers.deep_thinking]]
provider = "nonexistent"
model_id = "m"
max_context_tokens = 1000
priority = 1
"#,
        );
        let err = EngineConfig::discover_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn provider_override_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
[providers.anthropic]
api_key_env = "MY_ANTHROPIC_KEY"
"#,
        );
        let config = EngineConfig::discover_from(dir.path()).unwrap();
        assert_eq!(
            config.providers["anthropic"].api_key_env.as_deref(),
            Some("MY_ANTHROPIC_KEY")
        );
        assert!(config.providers.contains_key("openai"));
        assert!(config.providers.contains_key("google"));
    }
}
