//! Weighted agent selection.
//!
//! Scoring is a weighted sum over four signals (trigger keywords, category,
//! description overlap, tool coverage), with language/framework hints as
//! multiplicative modifiers. Selection is pure: the same registry snapshot
//! and context always produce the same result, with ties broken by
//! priority and then lexicographic id.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use superclaude_config::SelectionSection;
use superclaude_util::error::RegistryError;

use crate::context::TaskContext;
use crate::registry::AgentRegistry;
use crate::types::Agent;
use crate::FALLBACK_RATIONALE;

/// Candidates within this margin of the leader are surfaced as runners-up.
const AMBIGUITY_MARGIN: f64 = 0.02;

/// Language/framework hint multiplier.
const HINT_MULTIPLIER: f64 = 1.15;

/// Optional constraints on selection.
#[derive(Debug, Clone, Default)]
pub struct SelectionFilters {
    /// Tools the task requires; agents missing any are scored 0 on the
    /// tool signal and filtered from selection.
    pub required_tools: Vec<String>,
    /// Agent ids to exclude outright.
    pub exclude: Vec<String>,
    /// Hard category requirement.
    pub category: Option<String>,
}

/// The outcome of a selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub agent: Agent,
    pub score: f64,
    pub rationale: String,
    /// Runner-up ids within the ambiguity margin of the winner.
    pub runners_up: Vec<String>,
}

/// Select the best agent for a context.
///
/// Always returns an agent: when nothing clears `min_score` (or the
/// context is empty) the `general-purpose` fallback is returned with
/// rationale `"fallback"`.
pub fn select(
    registry: &AgentRegistry,
    context: &TaskContext,
    filters: &SelectionFilters,
    weights: &SelectionSection,
) -> Result<Selection, RegistryError> {
    if context.is_empty() {
        return Ok(fallback_selection("empty task context"));
    }

    let implied_categories = context.implied_categories();
    let mut scored: Vec<(Agent, f64)> = Vec::new();

    for agent in registry.all()? {
        if filters.exclude.iter().any(|id| id == &agent.id) {
            continue;
        }
        if let Some(required) = &filters.category
            && &agent.category != required
        {
            continue;
        }
        if !filters.required_tools.is_empty() && !tools_covered(&filters.required_tools, &agent) {
            continue;
        }

        let score = score_agent(&agent, context, &implied_categories, filters, weights);
        scored.push((agent, score));
    }

    // Deterministic order: score desc, priority desc, id asc
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.priority.cmp(&a.0.priority))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });

    let Some((leader, leader_score)) = scored.first().cloned() else {
        return Ok(fallback_selection("no agents matched the filters"));
    };

    if leader_score < weights.min_score {
        debug!(
            leader = %leader.id,
            score = leader_score,
            threshold = weights.min_score,
            "no agent above selection threshold"
        );
        return Ok(fallback_selection("no agent above selection threshold"));
    }

    let runners_up: Vec<String> = scored
        .iter()
        .skip(1)
        .take_while(|(_, score)| leader_score - score <= AMBIGUITY_MARGIN)
        .map(|(agent, _)| agent.id.clone())
        .collect();

    let rationale = if runners_up.is_empty() {
        format!(
            "matched {} (category {}, score {:.2})",
            leader.id, leader.category, leader_score
        )
    } else {
        format!(
            "matched {} (category {}, score {:.2}); close candidates: {}",
            leader.id,
            leader.category,
            leader_score,
            runners_up.join(", ")
        )
    };

    Ok(Selection {
        agent: leader,
        score: leader_score,
        rationale,
        runners_up,
    })
}

fn fallback_selection(detail: &str) -> Selection {
    Selection {
        agent: Agent::general_purpose(),
        score: 0.0,
        rationale: format!("{FALLBACK_RATIONALE}: {detail}"),
        runners_up: Vec::new(),
    }
}

/// The weighted scoring function.
fn score_agent(
    agent: &Agent,
    context: &TaskContext,
    implied_categories: &[String],
    filters: &SelectionFilters,
    weights: &SelectionSection,
) -> f64 {
    let trigger_signal = trigger_fraction(agent, context);
    let category_signal = if implied_categories.iter().any(|c| c == &agent.category) {
        1.0
    } else {
        0.0
    };
    let description_signal = description_overlap(agent, context);
    let tools_signal = if filters.required_tools.is_empty() || tools_covered(&filters.required_tools, agent) {
        1.0
    } else {
        0.0
    };

    let mut score = weights.trigger_weight * trigger_signal
        + weights.category_weight * category_signal
        + weights.description_weight * description_signal
        + weights.tools_weight * tools_signal;

    if context
        .detected_languages
        .iter()
        .any(|lang| agent.languages.iter().any(|l| l.eq_ignore_ascii_case(lang)))
    {
        score *= HINT_MULTIPLIER;
    }
    if context
        .detected_frameworks
        .iter()
        .any(|fw| agent.frameworks.iter().any(|f| f.eq_ignore_ascii_case(fw)))
    {
        score *= HINT_MULTIPLIER;
    }

    score.min(1.0)
}

/// Fraction of the agent's triggers found in the context keywords.
fn trigger_fraction(agent: &Agent, context: &TaskContext) -> f64 {
    if agent.triggers.is_empty() {
        return 0.0;
    }
    let keywords: BTreeSet<&str> = context.keywords.iter().map(String::as_str).collect();
    let hits = agent
        .triggers
        .iter()
        .filter(|t| keywords.contains(t.to_ascii_lowercase().as_str()))
        .count();
    hits as f64 / agent.triggers.len() as f64
}

/// Normalized token overlap between the agent description and the task text.
fn description_overlap(agent: &Agent, context: &TaskContext) -> f64 {
    let description_tokens: BTreeSet<String> = agent
        .description
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_ascii_lowercase)
        .collect();
    if description_tokens.is_empty() {
        return 0.0;
    }
    let keywords: BTreeSet<&str> = context.keywords.iter().map(String::as_str).collect();
    let overlap = description_tokens
        .iter()
        .filter(|t| keywords.contains(t.as_str()))
        .count();
    overlap as f64 / description_tokens.len() as f64
}

fn tools_covered(required: &[String], agent: &Agent) -> bool {
    required.iter().all(|tool| {
        agent
            .tools
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tool))
    })
}
