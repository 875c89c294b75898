//! The production improver: one loop iteration end to end.
//!
//! Each pass runs EXECUTE (single or consensus model call), applies
//! proposed file blocks to the worktree, runs the validation pipeline, and
//! collects signals. Provider outages degrade the pass instead of failing
//! it: the deterministic stages still run, and the loop's own rules decide
//! what happens next.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::json;
use tracing::{debug, warn};

use superclaude_agents::Agent;
use superclaude_config::ValidationSection;
use superclaude_quality::{FeedbackPacket, Improver, IterationOutcome, Signals, TestSignals};
use superclaude_router::{
    ChatParams, ChatRequest, ConsensusQuery, ConsensusResult, Message, ModelDescriptor,
    ModelRouter, Routed,
};
use superclaude_telemetry::{EventKind, EventLog, RunEvidence};
use superclaude_util::ids::RunId;
use superclaude_validation::{Pipeline, StageContext};
use superclaude_worktree::{PatchSummary, Worktree, WorktreeManager};

use crate::extraction::{apply_file_blocks, extract_file_blocks};

pub(crate) struct ImproverState {
    pub last_signals: Option<Signals>,
    pub last_consensus: Option<ConsensusResult>,
    pub degraded: bool,
}

/// Drives EXECUTE → RUN_VALIDATION → COLLECT_SIGNALS for the loop.
pub(crate) struct RunImprover {
    pub router: Arc<ModelRouter>,
    pub routed: Routed,
    /// Non-empty when the invocation asked for consensus.
    pub consensus_models: Vec<ModelDescriptor>,
    /// Caller-specified quorum; clamped by the consensus engine.
    pub consensus_quorum: Option<usize>,
    pub provider_deadline: Duration,
    pub consensus_deadline: Duration,
    pub pipeline: Pipeline,
    pub stage_root: Utf8PathBuf,
    pub tools: ValidationSection,
    pub expects_tests: bool,
    pub stage_deadline: Duration,
    pub evidence: Arc<RunEvidence>,
    pub events: Arc<EventLog>,
    pub run_id: RunId,
    pub task_text: String,
    pub agent: Agent,
    pub worktree: Option<Worktree>,
    pub manager: Option<Arc<WorktreeManager>>,
    pub state: Mutex<ImproverState>,
}

impl RunImprover {
    fn build_messages(&self, feedback: Option<&FeedbackPacket>) -> Vec<Message> {
        let mut messages = vec![
            Message::system(format!(
                "You are the '{}' agent: {}",
                self.agent.id, self.agent.description
            )),
            Message::user(self.task_text.clone()),
        ];
        if let Some(packet) = feedback {
            // Feedback extends the conversation; the original task stays
            messages.push(Message::user(format!(
                "The previous attempt scored {:.1}/100.\nNeeded improvements:\n{}\nNew findings:\n{}",
                packet.score,
                packet.improvements_needed.join("\n"),
                packet.new_findings.join("\n"),
            )));
        }
        messages
    }

    /// EXECUTE: one model call (or a consensus round). Returns the raw
    /// response text plus the external review verdict, or `None` on
    /// provider failure (the pass degrades, it does not abort).
    async fn execute_primary(
        &self,
        messages: Vec<Message>,
    ) -> (Option<String>, Option<f64>, bool) {
        if !self.consensus_models.is_empty() {
            let prompt = messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let mut query = ConsensusQuery::new(prompt, self.consensus_models.clone());
            query.deadline = self.consensus_deadline;
            query.quorum = self.consensus_quorum;

            let result = self.router.consensus(query).await;

            for vote in &result.votes {
                self.events.append(
                    &self.run_id,
                    EventKind::ConsensusVoted,
                    json!({ "model": vote.model, "verdict_len": vote.verdict.len() }),
                );
            }

            let external = if result.votes.is_empty() {
                None
            } else {
                Some(result.agreement_score * 100.0)
            };
            let response = result
                .winning_verdict
                .clone()
                .or_else(|| result.votes.first().map(|v| v.verdict.clone()));
            let degraded = !result.failures.is_empty() || result.votes.is_empty();

            self.state.lock().expect("improver state poisoned").last_consensus = Some(result);
            (response, external, degraded)
        } else {
            let request = ChatRequest::new(messages).with_params(ChatParams {
                deadline: self.provider_deadline,
                ..ChatParams::default()
            });
            match self.router.chat(&self.routed.descriptor, request).await {
                Ok(response) => (Some(response.text), None, false),
                Err(e) => {
                    warn!(error = %e, "primary model call failed, degrading iteration");
                    (None, None, true)
                }
            }
        }
    }

    async fn collect_diff(&self) -> PatchSummary {
        match (&self.manager, &self.worktree) {
            (Some(manager), Some(worktree)) => match manager.diff(worktree).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, "diff collection failed");
                    PatchSummary::default()
                }
            },
            _ => PatchSummary::default(),
        }
    }
}

#[async_trait]
impl Improver for RunImprover {
    async fn run_iteration(
        &self,
        index: u32,
        feedback: Option<&FeedbackPacket>,
    ) -> anyhow::Result<IterationOutcome> {
        let state = |name: &str| {
            self.events.append(
                &self.run_id,
                EventKind::RunState,
                json!({ "state": name, "iteration": index }),
            );
        };

        // EXECUTE
        state("EXECUTE_PRIMARY");
        let messages = self.build_messages(feedback);
        let (response, external_review, exec_degraded) = self.execute_primary(messages).await;

        let output_digest = match &response {
            Some(text) => {
                let blocks = extract_file_blocks(text);
                if !blocks.is_empty() && self.worktree.is_some() {
                    let written = apply_file_blocks(&self.stage_root, &blocks)?;
                    debug!(iteration = index, written, "applied proposed file changes");
                }
                if let Err(e) = self.evidence.write_iteration(
                    index,
                    &json!({ "response": text, "blocks": blocks.len() }),
                ) {
                    warn!(error = %e, "iteration evidence write failed");
                }
                Some(blake3::hash(text.as_bytes()).to_hex().to_string())
            }
            None => None,
        };

        // RUN_VALIDATION
        state("RUN_VALIDATION");
        let ctx = StageContext {
            root: self.stage_root.clone(),
            tools: self.tools.clone(),
            expects_tests: self.expects_tests,
            deadline: self.stage_deadline,
        };
        let report = self.pipeline.run(&ctx, Some(self.evidence.as_ref())).await;

        for result in &report.results {
            self.events.append(
                &self.run_id,
                EventKind::StageFinished,
                json!({
                    "stage": result.stage,
                    "passed": result.passed,
                    "findings": result.findings.len(),
                    "fatal": result.fatal_encountered,
                }),
            );
        }

        // COLLECT_SIGNALS
        state("COLLECT_SIGNALS");
        let checks = report.collected();
        let diff = self.collect_diff().await;
        let signals = Signals {
            tests: TestSignals {
                total: checks.tests_total,
                failed: checks.tests_failed,
                coverage_percent: checks.coverage_percent,
            },
            lint_clean: checks.lint_clean,
            typecheck_pass: checks.typecheck_pass,
            build_pass: checks.build_pass,
            security: superclaude_quality::SecuritySignals {
                critical: checks.security_critical,
                high: checks.security_high,
            },
            files_changed: diff.files.len() as u64,
            tests_changed: diff.tests_changed(),
        };

        let new_findings: Vec<String> = report
            .findings()
            .iter()
            .take(20)
            .map(|f| match &f.location {
                Some(location) => format!("[{}] {} ({location})", f.stage, f.message),
                None => format!("[{}] {}", f.stage, f.message),
            })
            .collect();

        state("SCORE");
        {
            let mut state = self.state.lock().expect("improver state poisoned");
            state.last_signals = Some(signals.clone());
            state.degraded |= exec_degraded;
        }

        Ok(IterationOutcome {
            signals,
            external_review,
            output_digest,
            new_findings,
            degraded: exec_degraded,
        })
    }
}
