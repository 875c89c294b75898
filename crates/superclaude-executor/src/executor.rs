//! The command executor.
//!
//! The only component that knows the full graph. A run moves through
//! PARSE → RESOLVE_METADATA → DERIVE_CONTEXT → SELECT_AGENT →
//! [OPEN_WORKTREE?] → PLAN → the agentic loop (EXECUTE_PRIMARY →
//! RUN_VALIDATION → COLLECT_SIGNALS → SCORE → DECIDE) → FINALIZE. Every
//! transition is observable as a `run.state` event, and exactly one
//! `run.finished` event closes each run.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;
use tracing::{info, warn};

use superclaude_agents::{AgentRegistry, SelectionFilters, TaskContext, select};
use superclaude_command::{Command, CommandMetadata, CommandRegistry, Complexity};
use superclaude_config::{Deadlines, EngineConfig, limits};
use superclaude_quality::{
    AgenticLoop, LoopConfig, LoopResult, QualityScorer, Signals, TerminationReason,
};
use superclaude_redaction::SecretRedactor;
use superclaude_router::{ModelRouter, tiers};
use superclaude_telemetry::{
    EventKind, EventLog, EvidenceRecord, EvidenceStore, FileSink, RunEvidence,
};
use superclaude_util::error::EngineError;
use superclaude_util::ids::RunId;
use superclaude_validation::Pipeline;
use superclaude_worktree::{MergeOutcome, Worktree, WorktreeManager};

use crate::improver::{ImproverState, RunImprover};
use crate::types::{ExecuteRequest, ExecuteResult, Outcome, RunState, causes};

/// The engine's orchestrator. Re-entrant across runs, never within one.
pub struct Executor {
    config: EngineConfig,
    commands: Arc<CommandRegistry>,
    agents: Arc<AgentRegistry>,
    router: Arc<ModelRouter>,
    events: Arc<EventLog>,
    evidence: Arc<EvidenceStore>,
}

impl Executor {
    /// Build an executor rooted at a workspace.
    ///
    /// Agents are discovered under `<workspace>/.superclaude/agents`,
    /// commands under `<workspace>/.superclaude/commands`, and telemetry
    /// lands in the configured metrics directory (default
    /// `<workspace>/.runs`).
    pub fn new(config: EngineConfig, workspace: &Utf8Path) -> anyhow::Result<Self> {
        let redactor = Arc::new(SecretRedactor::with_config(
            &config.security.extra_secret_patterns,
            &config.security.ignore_secret_patterns,
        )?);

        let base = config.telemetry_base(workspace);
        let events = Arc::new(EventLog::new(
            vec![Box::new(FileSink::new(
                superclaude_util::paths::events_path(&base),
            ))],
            Arc::clone(&redactor),
            config.telemetry.buffer_cap,
        ));
        let evidence = Arc::new(EvidenceStore::new(base, redactor));

        let commands = Arc::new(CommandRegistry::new(vec![
            workspace.join(".superclaude/commands").into_std_path_buf(),
        ]));
        let agents = Arc::new(AgentRegistry::new(
            vec![workspace.join(".superclaude/agents").into_std_path_buf()],
            config.selection.cache_ceiling,
        ));
        let router = Arc::new(ModelRouter::from_config(&config));

        Ok(Self {
            config,
            commands,
            agents,
            router,
            events,
            evidence,
        })
    }

    /// Assemble an executor from pre-built parts. Embedding and test seam.
    #[must_use]
    pub fn from_parts(
        config: EngineConfig,
        commands: Arc<CommandRegistry>,
        agents: Arc<AgentRegistry>,
        router: Arc<ModelRouter>,
        events: Arc<EventLog>,
        evidence: Arc<EvidenceStore>,
    ) -> Self {
        Self {
            config,
            commands,
            agents,
            router,
            events,
            evidence,
        }
    }

    /// Registry roots used by `new` for a given workspace.
    #[must_use]
    pub fn default_registry_roots(workspace: &Utf8Path) -> (PathBuf, PathBuf) {
        (
            workspace.join(".superclaude/commands").into_std_path_buf(),
            workspace.join(".superclaude/agents").into_std_path_buf(),
        )
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Only invocation-level failures (parse errors, unknown commands)
    /// return `Err`; they fail fast and create no run record. Every
    /// other failure is folded into an [`ExecuteResult`] with outcome
    /// `failed` and a written run record.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResult, EngineError> {
        // PARSE: fail fast, no run record
        let (command, metadata) = self.commands.parse(&request.command_text)?;

        let run_id = RunId::generate();
        let run_evidence = Arc::new(self.evidence.open_run(&run_id).map_err(|e| {
            EngineError::Internal(format!("failed to open evidence directory: {e}"))
        })?);

        self.events.append(
            &run_id,
            EventKind::RunStarted,
            json!({
                "command": command.raw_text,
                "name": format!("{}:{}", command.namespace, command.name),
                "working_dir": request.working_dir.as_str(),
            }),
        );

        let run = RunContext {
            config: self.config.clone(),
            agents: Arc::clone(&self.agents),
            router: Arc::clone(&self.router),
            events: Arc::clone(&self.events),
            run_evidence,
            run_id: run_id.clone(),
            command,
            metadata,
            request,
        };

        // Panic containment: an internal crash becomes a failed run with
        // the trace in evidence, never on stdout
        let handle = tokio::spawn(run.drive());
        match handle.await {
            Ok(result) => Ok(result),
            Err(join_error) => {
                let panic_message = if join_error.is_panic() {
                    match join_error.into_panic().downcast::<String>() {
                        Ok(s) => *s,
                        Err(payload) => match payload.downcast::<&'static str>() {
                            Ok(s) => (*s).to_string(),
                            Err(_) => "opaque panic payload".to_string(),
                        },
                    }
                } else {
                    "run task canceled".to_string()
                };
                warn!(run_id = %run_id, "run panicked, recording internal failure");

                let run_evidence = self
                    .evidence
                    .open_run(&run_id)
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                let _ = run_evidence.write_assessment(&json!({
                    "final_score": 0.0,
                    "band": "iterate",
                    "cause": causes::INTERNAL,
                    "panic": panic_message,
                }));
                self.events.append(
                    &run_id,
                    EventKind::AssessmentFinal,
                    json!({ "score": 0.0, "cause": causes::INTERNAL }),
                );
                self.events.append(
                    &run_id,
                    EventKind::RunFinished,
                    json!({ "outcome": "failed", "cause": causes::INTERNAL }),
                );

                Ok(ExecuteResult {
                    run_id,
                    outcome: Outcome::Failed,
                    final_assessment: None,
                    consensus: None,
                    evidence_path: run_evidence.run_dir().to_owned(),
                    iterations_used: 0,
                    termination_reason: Some(TerminationReason::Error),
                    errors: vec![format!("{}: {panic_message}", causes::INTERNAL)],
                })
            }
        }
    }
}

/// Everything one run needs, owned, so the run can be driven on its own
/// task for panic containment.
struct RunContext {
    config: EngineConfig,
    agents: Arc<AgentRegistry>,
    router: Arc<ModelRouter>,
    events: Arc<EventLog>,
    run_evidence: Arc<RunEvidence>,
    run_id: RunId,
    command: Command,
    metadata: CommandMetadata,
    request: ExecuteRequest,
}

impl RunContext {
    fn emit_state(&self, state: RunState) {
        self.events.append(
            &self.run_id,
            EventKind::RunState,
            json!({ "state": state.as_str() }),
        );
    }

    fn deadlines(&self) -> Deadlines {
        match self.request.deadlines {
            Some(requested) => Deadlines {
                provider_call: limits::clamp_deadline(
                    requested.provider_call,
                    limits::MAX_PROVIDER_CALL_DEADLINE,
                ),
                consensus: limits::clamp_deadline(
                    requested.consensus,
                    limits::MAX_CONSENSUS_DEADLINE,
                ),
                stage: limits::clamp_deadline(requested.stage, limits::MAX_STAGE_DEADLINE),
                iteration: limits::clamp_deadline(
                    requested.iteration,
                    limits::MAX_ITERATION_DEADLINE,
                ),
                run: limits::clamp_deadline(requested.run, limits::MAX_RUN_DEADLINE),
            },
            None => self.config.engine.deadlines(),
        }
    }

    async fn drive(self) -> ExecuteResult {
        self.emit_state(RunState::ResolveMetadata);
        let deadlines = self.deadlines();

        // DERIVE_CONTEXT
        self.emit_state(RunState::DeriveContext);
        let context = TaskContext::derive(
            &self.command.raw_text,
            &self.command.args,
            self.request.working_dir.as_std_path(),
        );

        // SELECT_AGENT
        self.emit_state(RunState::SelectAgent);
        let selection = match &self.metadata.default_agent {
            Some(id) => match self.agents.get(id) {
                Ok(agent) => superclaude_agents::Selection {
                    score: 1.0,
                    rationale: format!("default agent '{id}' from command metadata"),
                    runners_up: Vec::new(),
                    agent,
                },
                Err(_) => match select(
                    &self.agents,
                    &context,
                    &SelectionFilters::default(),
                    &self.config.selection,
                ) {
                    Ok(selection) => selection,
                    Err(e) => return self.fail(causes::INTERNAL, e.to_string(), None).await,
                },
            },
            None => match select(
                &self.agents,
                &context,
                &SelectionFilters::default(),
                &self.config.selection,
            ) {
                Ok(selection) => selection,
                Err(e) => return self.fail(causes::INTERNAL, e.to_string(), None).await,
            },
        };
        self.events.append(
            &self.run_id,
            EventKind::AgentSelected,
            json!({
                "agent": selection.agent.id,
                "score": selection.score,
                "rationale": selection.rationale,
                "runners_up": selection.runners_up,
            }),
        );

        // Required-evidence commands demand a tracked repository
        let is_repo = WorktreeManager::is_repository(&self.request.working_dir).await;
        if self.metadata.requires_evidence && !is_repo {
            return self
                .fail(
                    causes::NOT_A_REPOSITORY,
                    format!(
                        "command '{}' requires evidence but {} is not a tracked repository",
                        self.metadata.name, self.request.working_dir
                    ),
                    None,
                )
                .await;
        }

        // OPEN_WORKTREE
        let mut manager: Option<Arc<WorktreeManager>> = None;
        let mut worktree: Option<Worktree> = None;
        if self.metadata.expectations.expects_file_changes && is_repo {
            self.emit_state(RunState::OpenWorktree);
            match WorktreeManager::new(self.request.working_dir.clone()) {
                Ok(m) => {
                    let m = Arc::new(m);
                    match m
                        .open(&self.run_id, "HEAD", &self.run_evidence.worktree_dir())
                        .await
                    {
                        Ok(wt) => {
                            manager = Some(m);
                            worktree = Some(wt);
                        }
                        Err(e) => {
                            return self.fail(causes::INTERNAL, e.to_string(), None).await;
                        }
                    }
                }
                Err(e) => return self.fail(causes::INTERNAL, e.to_string(), None).await,
            }
        }

        // PLAN: route the model, decide on consensus
        self.emit_state(RunState::Plan);
        let tier = self.tier_for_command();
        let estimate = (self.command.raw_text.len() as u64) / 4 + 1;
        let routed = match self.router.route(&tier, estimate) {
            Ok(routed) => routed,
            Err(e) => {
                return self.fail(causes::NO_PROVIDER, e.to_string(), worktree_with(manager, worktree)).await;
            }
        };

        let consensus_requested = self
            .command
            .flags
            .get("consensus")
            .and_then(superclaude_command::FlagValue::as_bool)
            .unwrap_or(false);
        let consensus_quorum = self
            .command
            .flags
            .get("quorum")
            .and_then(superclaude_command::FlagValue::as_i64)
            .and_then(|n| usize::try_from(n).ok());
        let consensus_models = if consensus_requested {
            self.router
                .tier_candidates(&tier)
                .iter()
                .take(3)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        self.events.append(
            &self.run_id,
            EventKind::ModelSelected,
            json!({
                "provider": routed.descriptor.provider,
                "model": routed.descriptor.model_id,
                "tier": routed.tier_used,
                "degraded": routed.degraded,
                "degraded_reason": routed.degraded_reason,
                "consensus": consensus_requested,
            }),
        );

        // The loop drives EXECUTE_PRIMARY → RUN_VALIDATION →
        // COLLECT_SIGNALS → SCORE per iteration
        self.emit_state(RunState::Loop);
        let stage_root = match &worktree {
            Some(wt) => wt.root_path.clone(),
            None => self.request.working_dir.clone(),
        };

        let route_degraded = routed.degraded;
        let improver = RunImprover {
            router: Arc::clone(&self.router),
            routed,
            consensus_models,
            consensus_quorum,
            provider_deadline: deadlines.provider_call,
            consensus_deadline: deadlines.consensus,
            pipeline: Pipeline::new(&self.config.validation.optional_stages),
            stage_root,
            tools: self.config.validation.clone(),
            expects_tests: self.metadata.expectations.expects_tests,
            stage_deadline: deadlines.stage,
            evidence: Arc::clone(&self.run_evidence),
            events: Arc::clone(&self.events),
            run_id: self.run_id.clone(),
            task_text: self.command.raw_text.clone(),
            agent: selection.agent.clone(),
            worktree: worktree.clone(),
            manager: manager.clone(),
            state: Mutex::new(ImproverState {
                last_signals: None,
                last_consensus: None,
                degraded: route_degraded,
            }),
        };

        let max_iterations = limits::clamp_iterations(
            self.request
                .max_iterations
                .unwrap_or_else(|| self.config.engine.effective_max_iterations()),
        );
        let agentic = AgenticLoop::new(
            QualityScorer::new(self.config.quality.clone()),
            LoopConfig {
                max_iterations,
                deadline: deadlines.run,
                require_fresh_artifacts: self.metadata.requires_evidence,
                ..LoopConfig::default()
            },
        );
        let loop_result = agentic.run(&improver, &selection.agent.id).await;

        for record in &loop_result.history {
            self.events.append(
                &self.run_id,
                EventKind::IterationFinished,
                json!({
                    "index": record.index,
                    "score": record.assessment.final_score,
                    "band": record.assessment.band,
                    "termination": record.termination_reason,
                    "degraded": record.degraded,
                }),
            );
        }

        let improver_state = improver.state.into_inner().expect("improver state poisoned");
        self.finalize(
            loop_result,
            improver_state.last_signals.unwrap_or_default(),
            improver_state.last_consensus,
            improver_state.degraded || route_degraded,
            manager,
            worktree,
        )
        .await
    }

    /// FINALIZE: evidence enforcement, worktree close, record writes, and
    /// the terminal events.
    async fn finalize(
        &self,
        loop_result: LoopResult,
        signals: Signals,
        consensus: Option<superclaude_router::ConsensusResult>,
        degraded: bool,
        manager: Option<Arc<WorktreeManager>>,
        worktree: Option<Worktree>,
    ) -> ExecuteResult {
        self.emit_state(RunState::Finalize);

        let mut errors: Vec<String> = Vec::new();
        let mut assessment = loop_result.best_record.assessment.clone();
        let iterations_used = loop_result.history.len() as u32;
        let termination = loop_result.terminated_by;

        if let Some(error) = &loop_result.error {
            errors.push(error.clone());
        }

        // Evidence enforcement: success with empty evidence is disallowed
        let has_diff = signals.files_changed > 0;
        let has_test_artifacts = signals.tests.total > 0 || signals.tests_changed > 0;
        let missing_evidence =
            self.metadata.requires_evidence && !has_diff && !has_test_artifacts;

        let mut outcome = if missing_evidence {
            if degraded {
                // The run never had working providers; that is an
                // iteration problem, not a broken command
                errors.push(causes::MISSING_EVIDENCE.to_string());
                Outcome::NeedsIteration
            } else {
                errors.push(causes::MISSING_EVIDENCE.to_string());
                assessment.final_score = 0.0;
                assessment.band = superclaude_quality::Band::Iterate;
                Outcome::Failed
            }
        } else {
            match termination {
                TerminationReason::QualityMet => Outcome::Ok,
                TerminationReason::Error => Outcome::Failed,
                _ => Outcome::NeedsIteration,
            }
        };

        // Commands that owe no evidence (analysis, design) succeed with
        // warnings when the deterministic stages came back clean, even if
        // the quality target was out of reach for a plan-only artifact
        let soft_command = !self.metadata.requires_evidence
            && !self.metadata.expectations.expects_file_changes;
        if outcome == Outcome::NeedsIteration
            && soft_command
            && signals.security.clean()
            && signals.build_pass != Some(false)
            && termination != TerminationReason::Timeout
        {
            outcome = Outcome::OkWithWarnings;
        }

        let has_dissent = consensus
            .as_ref()
            .is_some_and(|c| !c.dissent.is_empty() || c.winning_verdict.is_none());
        if outcome == Outcome::Ok && (degraded || has_dissent) {
            outcome = Outcome::OkWithWarnings;
        }

        // Close the worktree exactly once, before the terminal event
        if let (Some(manager), Some(mut wt)) = (manager, worktree) {
            if matches!(outcome, Outcome::Ok | Outcome::OkWithWarnings) {
                match manager.merge(&mut wt).await {
                    Ok(MergeOutcome::Merged) => {
                        info!(run_id = %self.run_id, "worktree merged");
                    }
                    Ok(MergeOutcome::Conflict { detail }) => {
                        errors.push(format!("{}: {detail}", causes::WORKTREE_CONFLICT));
                        outcome = Outcome::Failed;
                        // Preserved for inspection, deliberately not discarded
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        outcome = Outcome::Failed;
                    }
                }
            } else if let Err(e) = manager.discard(&mut wt).await {
                // Orphaned for later garbage collection
                warn!(run_id = %self.run_id, error = %e, "worktree discard failed");
                errors.push(e.to_string());
            }
        }

        // Write the run record; the record aggregate is immutable once the
        // terminal events go out
        let command_snapshot = json!({
            "command": self.command,
            "metadata": self.metadata,
        });
        let mut artifacts = Vec::new();
        match self.run_evidence.write_command(&command_snapshot) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => errors.push(e.to_string()),
        }
        match self.run_evidence.write_signals(&signals) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => errors.push(e.to_string()),
        }
        match self.run_evidence.write_assessment(&assessment) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => errors.push(e.to_string()),
        }
        if let Some(consensus_result) = &consensus {
            match self.run_evidence.write_consensus(consensus_result) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let record = EvidenceRecord {
            run_id: self.run_id.clone(),
            command: command_snapshot,
            artifacts,
            signals: serde_json::to_value(&signals).unwrap_or_default(),
            assessment: serde_json::to_value(&assessment).unwrap_or_default(),
            consensus: consensus
                .as_ref()
                .and_then(|c| serde_json::to_value(c).ok()),
        };

        self.events.append(
            &self.run_id,
            EventKind::AssessmentFinal,
            json!({
                "score": assessment.final_score,
                "band": assessment.band,
                "cap_applied": assessment.cap_applied,
                "degraded": assessment.degraded,
            }),
        );
        self.events.append(
            &self.run_id,
            EventKind::RunFinished,
            json!({
                "outcome": outcome,
                "iterations": iterations_used,
                "termination": termination,
                "errors": errors,
                "artifacts": record.artifacts,
            }),
        );

        ExecuteResult {
            run_id: self.run_id.clone(),
            outcome,
            final_assessment: Some(assessment),
            consensus,
            evidence_path: self.run_evidence.run_dir().to_owned(),
            iterations_used,
            termination_reason: Some(termination),
            errors,
        }
    }

    /// Early structured failure: write a stub record, close any worktree,
    /// emit the terminal events.
    async fn fail(
        &self,
        cause: &str,
        detail: String,
        open_worktree: Option<(Arc<WorktreeManager>, Worktree)>,
    ) -> ExecuteResult {
        warn!(run_id = %self.run_id, cause, detail, "run failed before the loop");

        if let Some((manager, mut wt)) = open_worktree
            && let Err(e) = manager.discard(&mut wt).await
        {
            warn!(run_id = %self.run_id, error = %e, "worktree discard failed");
        }

        let _ = self.run_evidence.write_command(&json!({
            "command": self.command,
            "metadata": self.metadata,
        }));
        let _ = self.run_evidence.write_assessment(&json!({
            "final_score": 0.0,
            "band": "iterate",
            "cause": cause,
            "detail": detail,
        }));

        self.events.append(
            &self.run_id,
            EventKind::AssessmentFinal,
            json!({ "score": 0.0, "cause": cause }),
        );
        self.events.append(
            &self.run_id,
            EventKind::RunFinished,
            json!({ "outcome": "failed", "cause": cause, "detail": detail }),
        );

        ExecuteResult {
            run_id: self.run_id.clone(),
            outcome: Outcome::Failed,
            final_assessment: None,
            consensus: None,
            evidence_path: self.run_evidence.run_dir().to_owned(),
            iterations_used: 0,
            termination_reason: None,
            errors: vec![format!("{cause}: {detail}")],
        }
    }

    /// Map flags and complexity to a task tier.
    fn tier_for_command(&self) -> String {
        if let Some(tier) = self
            .command
            .flags
            .get("tier")
            .and_then(superclaude_command::FlagValue::as_str)
        {
            return tier.to_string();
        }
        match self.metadata.complexity {
            Complexity::High => tiers::DEEP_THINKING.to_string(),
            Complexity::Medium | Complexity::Low => tiers::FAST_ITERATION.to_string(),
        }
    }
}

/// Helper: bundle an open worktree with its manager for early-failure
/// cleanup.
fn worktree_with(
    manager: Option<Arc<WorktreeManager>>,
    worktree: Option<Worktree>,
) -> Option<(Arc<WorktreeManager>, Worktree)> {
    match (manager, worktree) {
        (Some(m), Some(w)) => Some((m, w)),
        _ => None,
    }
}

/// Clamp a caller-supplied iteration override. Exposed for the binary's
/// `--max-iterations` flag.
#[must_use]
pub fn clamp_requested_iterations(requested: Option<u32>) -> Option<u32> {
    requested.map(limits::clamp_iterations)
}
