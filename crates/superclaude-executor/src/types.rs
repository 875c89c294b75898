//! Executor request/result shapes and the observable run states.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use superclaude_config::Deadlines;
use superclaude_quality::{QualityAssessment, TerminationReason};
use superclaude_router::ConsensusResult;
use superclaude_util::ids::RunId;

/// Input to one command execution.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// The textual invocation, e.g. `/sc:implement "Add health endpoint"`.
    pub command_text: String,
    pub working_dir: Utf8PathBuf,
    /// Engine-level overrides (iteration budget); clamped like every other
    /// intake path.
    pub max_iterations: Option<u32>,
    /// Deadline overrides; clamped to the hard caps.
    pub deadlines: Option<Deadlines>,
}

impl ExecuteRequest {
    #[must_use]
    pub fn new(command_text: impl Into<String>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            command_text: command_text.into(),
            working_dir: working_dir.into(),
            max_iterations: None,
            deadlines: None,
        }
    }
}

/// Coarse outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    OkWithWarnings,
    NeedsIteration,
    Failed,
}

impl Outcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> superclaude_util::exit_codes::ExitCode {
        use superclaude_util::exit_codes::ExitCode;
        match self {
            Self::Ok | Self::OkWithWarnings => ExitCode::Success,
            Self::NeedsIteration => ExitCode::NeedsIteration,
            Self::Failed => ExitCode::Failed,
        }
    }
}

/// Output of one command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub run_id: RunId,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_assessment: Option<QualityAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusResult>,
    pub evidence_path: Utf8PathBuf,
    pub iterations_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
    pub errors: Vec<String>,
}

/// The states a run moves through, observable as `run.state` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Parse,
    ResolveMetadata,
    DeriveContext,
    SelectAgent,
    OpenWorktree,
    Plan,
    ExecutePrimary,
    RunValidation,
    CollectSignals,
    Score,
    Loop,
    Finalize,
}

impl RunState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "PARSE",
            Self::ResolveMetadata => "RESOLVE_METADATA",
            Self::DeriveContext => "DERIVE_CONTEXT",
            Self::SelectAgent => "SELECT_AGENT",
            Self::OpenWorktree => "OPEN_WORKTREE",
            Self::Plan => "PLAN",
            Self::ExecutePrimary => "EXECUTE_PRIMARY",
            Self::RunValidation => "RUN_VALIDATION",
            Self::CollectSignals => "COLLECT_SIGNALS",
            Self::Score => "SCORE",
            Self::Loop => "LOOP",
            Self::Finalize => "FINALIZE",
        }
    }
}

/// Structured causes carried in `ExecuteResult::errors` and evidence.
pub mod causes {
    pub const MISSING_EVIDENCE: &str = "missing_evidence";
    pub const WORKTREE_CONFLICT: &str = "worktree_conflict";
    pub const NOT_A_REPOSITORY: &str = "not_a_repository";
    pub const NO_PROVIDER: &str = "no_provider";
    pub const INTERNAL: &str = "internal";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes_follow_contract() {
        assert_eq!(Outcome::Ok.exit_code().as_i32(), 0);
        assert_eq!(Outcome::OkWithWarnings.exit_code().as_i32(), 0);
        assert_eq!(Outcome::NeedsIteration.exit_code().as_i32(), 1);
        assert_eq!(Outcome::Failed.exit_code().as_i32(), 2);
    }

    #[test]
    fn run_state_names_are_screaming_snake() {
        assert_eq!(RunState::ExecutePrimary.as_str(), "EXECUTE_PRIMARY");
        let json = serde_json::to_string(&RunState::OpenWorktree).unwrap();
        assert_eq!(json, "\"OPEN_WORKTREE\"");
    }
}
