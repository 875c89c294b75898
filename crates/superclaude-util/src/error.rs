//! Engine-wide error taxonomy.
//!
//! Leaf components surface typed errors; the executor folds them into run
//! outcomes. Only invocation and configuration errors reach the user as raw
//! messages; everything else is summarized with a pointer into evidence.

use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Library-level error type returned by engine operations.
///
/// # Exit Code Mapping
///
/// Use [`to_exit_code()`](Self::to_exit_code) to map errors to process exit
/// codes:
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 3 | Invocation (parse/unknown command/bad flag) |
/// | 2 | Everything else (configuration, provider, pipeline, internal) |
///
/// Run *outcomes* (`ok`, `needs_iteration`, …) map to exit codes separately;
/// this table only covers errors that prevent a run from producing a result.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invocation error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Validation pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Map this error to a process exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Parse(_) => ExitCode::Invocation,
            _ => ExitCode::Failed,
        }
    }
}

/// Errors produced while parsing a textual command invocation.
///
/// These fail fast with exit code 3 and never create a run record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command text")]
    Empty,

    #[error("command must start with '/', got '{text}'")]
    MissingSlash { text: String },

    #[error("command '{text}' is missing the ':' namespace separator")]
    MissingSeparator { text: String },

    #[error("unknown namespace '{namespace}'")]
    UnknownNamespace { namespace: String },

    #[error("unknown command '{namespace}:{name}'")]
    UnknownCommand { namespace: String, name: String },

    #[error("unknown flag '--{flag}' for command '{command}'")]
    UnknownFlag { flag: String, command: String },

    #[error("flag '--{flag}' expects a {expected} value, got '{value}'")]
    InvalidFlagValue {
        flag: String,
        value: String,
        expected: String,
    },

    #[error("flag '--{flag}' requires a value")]
    MissingFlagValue { flag: String },

    #[error("value '{value}' for flag '--{flag}' is not in the allowed set [{allowed}]")]
    DisallowedFlagValue {
        flag: String,
        value: String,
        allowed: String,
    },

    #[error("unterminated quote in command text")]
    UnterminatedQuote,

    #[error("invalid identifier '{ident}': only ASCII alphanumerics, '-' and '_' are allowed")]
    InvalidIdentifier { ident: String },
}

/// Configuration discovery and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },
}

/// Typed failures from provider adapters.
///
/// Adapters classify every non-2xx response they can recognize instead of
/// surfacing raw HTTP failures; classification is the contract.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} authentication failed: {message}")]
    Auth { provider: String, message: String },

    #[error("{provider} rate limit exceeded: {message}")]
    RateLimit { provider: String, message: String },

    #[error("{provider} network failure: {message}")]
    Network { provider: String, message: String },

    #[error("{provider} rejected the request: {message}")]
    BadRequest { provider: String, message: String },

    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },
}

impl ProviderError {
    /// True when a retry against the same provider could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Unavailable { .. })
    }

    /// Construct the canonical error for a call canceled by a deadline.
    ///
    /// Canceled calls must never surface as success, and they classify as
    /// unavailability rather than a transport fault.
    #[must_use]
    pub fn deadline(provider: &str, elapsed: Duration) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: format!("call canceled after {}s deadline", elapsed.as_secs()),
        }
    }
}

/// Routing failures: no model can serve the requested tier.
#[derive(Error, Debug, Clone)]
pub enum RouterError {
    #[error("unknown task tier '{tier}'")]
    UnknownTier { tier: String },

    #[error("no provider available for tier '{tier}' (checked {checked} descriptors)")]
    NoProvider { tier: String, checked: usize },
}

/// Agent and command registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry discovery failed under {root}: {reason}")]
    DiscoveryFailed { root: String, reason: String },

    #[error("no entry with id '{id}'")]
    NotFound { id: String },
}

/// Validation pipeline errors that are not expressible as findings.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("stage '{stage}' could not spawn tool '{tool}': {reason}")]
    ToolSpawn {
        stage: String,
        tool: String,
        reason: String,
    },

    #[error("stage '{stage}' exceeded its {seconds}s deadline")]
    Deadline { stage: String, seconds: u64 },
}

/// Worktree lifecycle errors.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error("git binary not found on PATH")]
    GitMissing,

    #[error("working directory is not a tracked repository: {path}")]
    NotARepository { path: String },

    #[error("failed to open worktree: {reason}")]
    OpenFailed { reason: String },

    #[error("merge conflict in {} file(s): {}", paths.len(), paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    #[error("worktree '{id}' is already closed")]
    AlreadyClosed { id: String },

    #[error("failed to discard worktree '{id}': {reason}")]
    DiscardFailed { id: String, reason: String },

    #[error("git {operation} failed: {stderr}")]
    GitFailed { operation: String, stderr: String },
}

/// Telemetry and evidence persistence errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("failed to lock event log: {reason}")]
    LockFailed { reason: String },

    #[error("failed to serialize event payload: {reason}")]
    Serialize { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_map_to_invocation_exit_code() {
        let err = EngineError::from(ParseError::Empty);
        assert_eq!(err.to_exit_code(), ExitCode::Invocation);

        let err = EngineError::from(ParseError::UnknownCommand {
            namespace: "sc".into(),
            name: "nope".into(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::Invocation);
    }

    #[test]
    fn non_parse_errors_map_to_failed_exit_code() {
        let err = EngineError::from(ConfigError::MissingRequired {
            key: "tiers".into(),
        });
        assert_eq!(err.to_exit_code(), ExitCode::Failed);

        let err = EngineError::Internal("boom".into());
        assert_eq!(err.to_exit_code(), ExitCode::Failed);
    }

    #[test]
    fn provider_transience_classification() {
        let net = ProviderError::Network {
            provider: "anthropic".into(),
            message: "reset".into(),
        };
        assert!(net.is_transient());

        let auth = ProviderError::Auth {
            provider: "anthropic".into(),
            message: "401".into(),
        };
        assert!(!auth.is_transient());
    }

    #[test]
    fn deadline_error_is_unavailable() {
        let err = ProviderError::deadline("openai", Duration::from_secs(60));
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert!(err.to_string().contains("60s"));
    }

    #[test]
    fn merge_conflict_lists_paths() {
        let err = WorktreeError::MergeConflict {
            paths: vec!["src/a.rs".into(), "src/b.rs".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 file(s)"));
        assert!(msg.contains("src/a.rs"));
    }
}
