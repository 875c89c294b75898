//! Multi-model consensus.
//!
//! Fan a prompt out to several models in parallel, normalize each response
//! into a verdict, group verdicts into equivalence classes, and apply the
//! quorum and tie-break rules. Voter results are unordered; reduction sorts
//! votes by model id first so the outcome is deterministic regardless of
//! arrival order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use superclaude_providers::{ChatParams, ChatRequest, ChatResponse, Message, ModelDescriptor};

use crate::router::ModelRouter;

/// Reason recorded when no verdict could win.
pub const REASON_INSUFFICIENT_VOTERS: &str = "insufficient_voters";
pub const REASON_NO_QUORUM: &str = "no_quorum";

/// How ties between equal-size verdict classes are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TieBreak {
    /// Verdict of the highest-priority voter wins.
    #[default]
    #[serde(rename = "priority")]
    Priority,
    /// Majority class with the most total response length wins.
    #[serde(rename = "longest-majority")]
    LongestMajority,
    /// Leave the tie unresolved.
    #[serde(rename = "abstain")]
    Abstain,
}

/// Normalizes a raw response into a comparable verdict.
pub type VerdictExtractor = Arc<dyn Fn(&ChatResponse) -> String + Send + Sync>;

/// The default extractor: a structured `answer` field when the response is
/// JSON, otherwise the trimmed full text.
#[must_use]
pub fn default_extractor() -> VerdictExtractor {
    Arc::new(|response: &ChatResponse| {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(response.text.trim())
            && let Some(answer) = value.get("answer").and_then(|a| a.as_str())
        {
            return answer.trim().to_string();
        }
        response.text.trim().to_string()
    })
}

/// Default quorum: `⌈n/2⌉ + 1`, the smallest count that cannot be matched
/// by a disjoint class.
#[must_use]
pub fn default_quorum(n: usize) -> usize {
    n.div_ceil(2) + 1
}

/// A consensus request.
#[derive(Clone)]
pub struct ConsensusQuery {
    pub prompt: String,
    pub models: Vec<ModelDescriptor>,
    /// Agreeing verdicts required to win; defaults to [`default_quorum`]
    /// of the voter count and is clamped to it from above.
    pub quorum: Option<usize>,
    pub tie_break: TieBreak,
    /// Deadline for the whole query.
    pub deadline: Duration,
    /// Verdict normalization; defaults to [`default_extractor`].
    pub extractor: Option<VerdictExtractor>,
}

impl ConsensusQuery {
    #[must_use]
    pub fn new(prompt: impl Into<String>, models: Vec<ModelDescriptor>) -> Self {
        Self {
            prompt: prompt.into(),
            models,
            quorum: None,
            tie_break: TieBreak::default(),
            deadline: Duration::from_secs(120),
            extractor: None,
        }
    }
}

/// One voter's contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub model: String,
    pub verdict: String,
    pub metadata: serde_json::Value,
}

/// Reduced outcome of a consensus query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub votes: Vec<Vote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_verdict: Option<String>,
    /// |largest equivalence class| / |votes|; 0 when nobody voted.
    pub agreement_score: f64,
    /// Verdicts outside the winning class (one entry per dissenting vote).
    pub dissent: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved_reason: Option<String>,
    /// Voters that failed or timed out, with their error text.
    pub failures: Vec<VoterFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterFailure {
    pub model: String,
    pub error: String,
}

impl ModelRouter {
    /// Run a consensus query.
    ///
    /// Individual voter failures reduce the effective voter count rather
    /// than failing the query. Once the quorum is already satisfied by
    /// completed votes, remaining voters are canceled best-effort; their
    /// absence never corrupts the reduction, which uses completed votes
    /// only.
    pub async fn consensus(&self, query: ConsensusQuery) -> ConsensusResult {
        let extractor = query.extractor.clone().unwrap_or_else(default_extractor);
        let requested = query.models.len();
        let quorum = effective_quorum(query.quorum, requested);

        let mut join_set: JoinSet<(String, u32, Result<ChatResponse, String>)> = JoinSet::new();

        for descriptor in query.models.clone() {
            let adapter = match self.adapter(&descriptor.provider) {
                Ok(adapter) => adapter,
                Err(e) => {
                    // Construction failure counts as a voter failure up front
                    join_set.spawn(async move {
                        (descriptor.model_id.clone(), descriptor.priority, Err(e.to_string()))
                    });
                    continue;
                }
            };

            let request = ChatRequest::new(vec![Message::user(query.prompt.clone())]).with_params(
                ChatParams {
                    deadline: query.deadline,
                    ..ChatParams::default()
                },
            );
            let deadline = query.deadline;

            join_set.spawn(async move {
                let outcome =
                    match tokio::time::timeout(deadline, adapter.chat(&descriptor, request)).await
                    {
                        Ok(Ok(response)) => Ok(response),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!(
                            "voter canceled after {}s deadline",
                            deadline.as_secs()
                        )),
                    };
                (descriptor.model_id.clone(), descriptor.priority, outcome)
            });
        }

        let mut votes: Vec<(Vote, u32, usize)> = Vec::new();
        let mut failures: Vec<VoterFailure> = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((model, priority, Ok(response))) => {
                    let verdict = extractor(&response);
                    let response_len = response.text.len();
                    debug!(model = %model, verdict_len = verdict.len(), "consensus vote received");
                    votes.push((
                        Vote {
                            model,
                            verdict,
                            metadata: serde_json::json!({
                                "tokens_in": response.tokens_in,
                                "tokens_out": response.tokens_out,
                                "stop_reason": response.stop_reason,
                            }),
                        },
                        priority,
                        response_len,
                    ));
                }
                Ok((model, _priority, Err(error))) => {
                    warn!(model = %model, error = %error, "consensus voter failed");
                    failures.push(VoterFailure { model, error });
                }
                Err(join_error) => {
                    // Canceled voters: not votes, not counted failures
                    debug!(error = %join_error, "consensus voter task ended early");
                }
            }

            // Early exit: quorum already satisfied by completed votes
            if largest_class_size(&votes) >= quorum {
                join_set.abort_all();
            }
        }

        reduce(votes, failures, quorum, query.tie_break)
    }
}

/// Clamp a caller-provided quorum into `1..=default_quorum(n)`.
fn effective_quorum(requested: Option<usize>, n: usize) -> usize {
    let ceiling = default_quorum(n);
    match requested {
        Some(q) => q.clamp(1, ceiling),
        None => ceiling,
    }
}

fn largest_class_size(votes: &[(Vote, u32, usize)]) -> usize {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (vote, _, _) in votes {
        *counts.entry(vote.verdict.as_str()).or_insert(0) += 1;
    }
    counts.values().copied().max().unwrap_or(0)
}

/// Deterministic reduction of completed votes.
fn reduce(
    mut votes: Vec<(Vote, u32, usize)>,
    failures: Vec<VoterFailure>,
    quorum: usize,
    tie_break: TieBreak,
) -> ConsensusResult {
    // Arrival order is meaningless; model-id order makes reduction stable
    votes.sort_by(|a, b| a.0.model.cmp(&b.0.model));

    let n = votes.len();
    if n < quorum {
        let plain: Vec<Vote> = votes.into_iter().map(|(v, _, _)| v).collect();
        let dissent: Vec<String> = plain.iter().map(|v| v.verdict.clone()).collect();
        return ConsensusResult {
            agreement_score: 0.0,
            winning_verdict: None,
            dissent,
            unresolved_reason: Some(REASON_INSUFFICIENT_VOTERS.to_string()),
            failures,
            votes: plain,
        };
    }

    // Equivalence classes keyed by verdict, in stable verdict order
    let mut classes: BTreeMap<String, ClassAccum> = BTreeMap::new();
    for (vote, priority, response_len) in &votes {
        let entry = classes.entry(vote.verdict.clone()).or_default();
        entry.count += 1;
        entry.total_len += response_len;
        // Track the strongest voter in the class: highest priority, with
        // stable model-id order deciding between equal priorities
        let stronger = *priority > entry.best_priority
            || (*priority == entry.best_priority
                && (entry.best_model.is_empty() || vote.model < entry.best_model));
        if stronger {
            entry.best_priority = *priority;
            entry.best_model = vote.model.clone();
        }
    }

    let largest = classes.values().map(|c| c.count).max().unwrap_or(0);
    let agreement_score = largest as f64 / n as f64;

    let leaders: Vec<(&String, &ClassAccum)> =
        classes.iter().filter(|(_, c)| c.count == largest).collect();

    let winning_verdict = if largest < quorum {
        None
    } else if leaders.len() == 1 {
        Some(leaders[0].0.clone())
    } else {
        match tie_break {
            TieBreak::Priority => leaders
                .iter()
                .max_by(|a, b| {
                    a.1.best_priority
                        .cmp(&b.1.best_priority)
                        // Equal priorities: stable model-id order decides
                        .then_with(|| b.1.best_model.cmp(&a.1.best_model))
                })
                .map(|(verdict, _)| (*verdict).clone()),
            TieBreak::LongestMajority => leaders
                .iter()
                .max_by(|a, b| {
                    a.1.total_len
                        .cmp(&b.1.total_len)
                        .then_with(|| b.0.cmp(a.0))
                })
                .map(|(verdict, _)| (*verdict).clone()),
            TieBreak::Abstain => None,
        }
    };

    let unresolved_reason = if winning_verdict.is_none() {
        Some(REASON_NO_QUORUM.to_string())
    } else {
        None
    };

    let plain: Vec<Vote> = votes.into_iter().map(|(v, _, _)| v).collect();
    let dissent: Vec<String> = match &winning_verdict {
        Some(winner) => plain
            .iter()
            .filter(|v| &v.verdict != winner)
            .map(|v| v.verdict.clone())
            .collect(),
        None => plain.iter().map(|v| v.verdict.clone()).collect(),
    };

    ConsensusResult {
        votes: plain,
        winning_verdict,
        agreement_score,
        dissent,
        unresolved_reason,
        failures,
    }
}

#[derive(Default)]
struct ClassAccum {
    count: usize,
    total_len: usize,
    best_priority: u32,
    best_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use superclaude_config::EngineConfig;
    use superclaude_providers::{ProviderAdapter, ScriptedCall, StaticProvider};
    use superclaude_util::error::ProviderError;

    fn descriptor(provider: &str, model: &str, priority: u32) -> ModelDescriptor {
        ModelDescriptor {
            provider: provider.into(),
            model_id: model.into(),
            max_context_tokens: 100_000,
            capabilities: vec![],
            priority,
            cost_hint: None,
        }
    }

    fn router_with_scripts(scripts: Vec<(&str, Vec<ScriptedCall>)>) -> ModelRouter {
        let mut adapters: Map<String, Arc<dyn ProviderAdapter>> = Map::new();
        for (name, calls) in scripts {
            let provider = StaticProvider::new(name);
            for call in calls {
                provider.push(call);
            }
            adapters.insert(name.to_string(), Arc::new(provider));
        }
        ModelRouter::with_adapters(&EngineConfig::minimal_for_testing(), adapters)
    }

    fn respond(text: &str) -> ScriptedCall {
        ScriptedCall::Respond(superclaude_providers::ChatResponse::new(text))
    }

    #[test]
    fn default_quorum_is_majority_plus_one() {
        assert_eq!(default_quorum(2), 2);
        assert_eq!(default_quorum(3), 3);
        assert_eq!(default_quorum(4), 3);
        assert_eq!(default_quorum(5), 4);
    }

    #[tokio::test]
    async fn split_vote_with_quorum_two_resolves() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("A")]),
            ("p2", vec![respond("A")]),
            ("p3", vec![respond("B")]),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![
                descriptor("p1", "m1", 3),
                descriptor("p2", "m2", 2),
                descriptor("p3", "m3", 1),
            ],
        );
        query.quorum = Some(2);

        let result = router.consensus(query).await;
        assert_eq!(result.winning_verdict.as_deref(), Some("A"));
        assert!((result.agreement_score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.dissent, vec!["B".to_string()]);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn agreement_score_law_holds() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("X")]),
            ("p2", vec![respond("Y")]),
            ("p3", vec![respond("X")]),
            ("p4", vec![respond("X")]),
        ]);
        let query = ConsensusQuery::new(
            "verdict?",
            vec![
                descriptor("p1", "m1", 1),
                descriptor("p2", "m2", 1),
                descriptor("p3", "m3", 1),
                descriptor("p4", "m4", 1),
            ],
        );

        let result = router.consensus(query).await;
        let largest = (result.agreement_score * result.votes.len() as f64).round() as usize;
        assert_eq!(largest, 3);
        // default quorum for 4 voters is 3 → X wins
        assert_eq!(result.winning_verdict.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn failing_voter_reduces_effective_n() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("A")]),
            (
                "p2",
                vec![ScriptedCall::Fail(ProviderError::Unavailable {
                    provider: "p2".into(),
                    message: "down".into(),
                })],
            ),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![descriptor("p1", "m1", 1), descriptor("p2", "m2", 1)],
        );
        query.quorum = Some(2);

        let result = router.consensus(query).await;
        assert_eq!(result.winning_verdict, None);
        assert_eq!(
            result.unresolved_reason.as_deref(),
            Some(REASON_INSUFFICIENT_VOTERS)
        );
        assert_eq!(result.votes.len(), 1);
        assert_eq!(result.failures.len(), 1);
    }

    #[tokio::test]
    async fn priority_tie_break_picks_highest_priority_voter() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("A")]),
            ("p2", vec![respond("B")]),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![descriptor("p1", "m1", 10), descriptor("p2", "m2", 1)],
        );
        query.quorum = Some(1);
        query.tie_break = TieBreak::Priority;

        let result = router.consensus(query).await;
        assert_eq!(result.winning_verdict.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn abstain_tie_break_leaves_unresolved() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("A")]),
            ("p2", vec![respond("B")]),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![descriptor("p1", "m1", 1), descriptor("p2", "m2", 1)],
        );
        query.quorum = Some(1);
        query.tie_break = TieBreak::Abstain;

        let result = router.consensus(query).await;
        assert_eq!(result.winning_verdict, None);
        assert_eq!(result.unresolved_reason.as_deref(), Some(REASON_NO_QUORUM));
        assert_eq!(result.dissent.len(), 2);
    }

    #[tokio::test]
    async fn longest_majority_tie_break_uses_response_length() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond("A")]),
            ("p2", vec![respond("B with much longer supporting text")]),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![descriptor("p1", "m1", 5), descriptor("p2", "m2", 1)],
        );
        query.quorum = Some(1);
        query.tie_break = TieBreak::LongestMajority;

        let result = router.consensus(query).await;
        assert_eq!(
            result.winning_verdict.as_deref(),
            Some("B with much longer supporting text")
        );
    }

    #[tokio::test]
    async fn extractor_prefers_structured_answer_field() {
        let router = router_with_scripts(vec![
            ("p1", vec![respond(r#"{"answer": "A", "confidence": 0.9}"#)]),
            ("p2", vec![respond("A")]),
        ]);
        let mut query = ConsensusQuery::new(
            "verdict?",
            vec![descriptor("p1", "m1", 1), descriptor("p2", "m2", 1)],
        );
        query.quorum = Some(2);

        let result = router.consensus(query).await;
        assert_eq!(result.winning_verdict.as_deref(), Some("A"));
        assert!((result.agreement_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reduction_is_order_independent() {
        let vote = |model: &str, verdict: &str| {
            (
                Vote {
                    model: model.into(),
                    verdict: verdict.into(),
                    metadata: serde_json::Value::Null,
                },
                1u32,
                verdict.len(),
            )
        };

        let forward = reduce(
            vec![vote("m1", "A"), vote("m2", "A"), vote("m3", "B")],
            vec![],
            2,
            TieBreak::Priority,
        );
        let reversed = reduce(
            vec![vote("m3", "B"), vote("m2", "A"), vote("m1", "A")],
            vec![],
            2,
            TieBreak::Priority,
        );

        assert_eq!(forward.winning_verdict, reversed.winning_verdict);
        assert_eq!(forward.agreement_score, reversed.agreement_score);
        let models: Vec<&str> = forward.votes.iter().map(|v| v.model.as_str()).collect();
        assert_eq!(models, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_priority_tie_break_uses_model_id_order() {
        let vote = |model: &str, verdict: &str| {
            (
                Vote {
                    model: model.into(),
                    verdict: verdict.into(),
                    metadata: serde_json::Value::Null,
                },
                1u32,
                verdict.len(),
            )
        };

        // Two classes of size one, equal priority; m1 < m2 so its class wins
        let result = reduce(
            vec![vote("m2", "B"), vote("m1", "A")],
            vec![],
            1,
            TieBreak::Priority,
        );
        assert_eq!(result.winning_verdict.as_deref(), Some("A"));
    }

    #[test]
    fn caller_quorum_is_clamped_to_ceiling() {
        assert_eq!(effective_quorum(Some(10), 3), 3);
        assert_eq!(effective_quorum(Some(2), 3), 2);
        assert_eq!(effective_quorum(Some(0), 3), 1);
        assert_eq!(effective_quorum(None, 4), 3);
    }
}
