//! Event shapes for the append-only log.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use superclaude_util::ids::RunId;

/// Kinds of events the engine emits over a run's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "run.started")]
    RunStarted,
    #[serde(rename = "run.state")]
    RunState,
    #[serde(rename = "agent.selected")]
    AgentSelected,
    #[serde(rename = "model.selected")]
    ModelSelected,
    #[serde(rename = "consensus.voted")]
    ConsensusVoted,
    #[serde(rename = "stage.finished")]
    StageFinished,
    #[serde(rename = "iteration.finished")]
    IterationFinished,
    #[serde(rename = "assessment.final")]
    AssessmentFinal,
    #[serde(rename = "run.finished")]
    RunFinished,
}

impl EventKind {
    /// Terminal events survive buffer pressure unconditionally.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::AssessmentFinal | Self::RunFinished)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::RunState => "run.state",
            Self::AgentSelected => "agent.selected",
            Self::ModelSelected => "model.selected",
            Self::ConsensusVoted => "consensus.voted",
            Self::StageFinished => "stage.finished",
            Self::IterationFinished => "iteration.finished",
            Self::AssessmentFinal => "assessment.final",
            Self::RunFinished => "run.finished",
        }
    }
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic per-run sequence number, starting at 1.
    pub seq: u64,
    pub run_id: RunId,
    /// RFC3339 timestamp with nanosecond precision.
    pub ts: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

impl Event {
    #[must_use]
    pub fn new(seq: u64, run_id: RunId, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            seq,
            run_id,
            ts: now_rfc3339_nanos(),
            kind,
            payload,
        }
    }
}

/// Current time as RFC3339 with nanosecond precision.
#[must_use]
pub(crate) fn now_rfc3339_nanos() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
