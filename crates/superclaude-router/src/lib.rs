//! Model routing and consensus.
//!
//! The router maps task tiers (`deep_thinking`, `long_context`,
//! `fast_iteration`, `fallback`) to concrete models by priority, degrading
//! through tiers when providers are unavailable. The consensus engine fans
//! a prompt out to several models in parallel, reduces their verdicts into
//! equivalence classes, and applies quorum and tie-break rules.

mod consensus;
mod router;

pub use consensus::{
    ConsensusQuery, ConsensusResult, TieBreak, Vote, VerdictExtractor, default_extractor,
    default_quorum,
};
pub use router::{ModelRouter, Routed, tiers};

pub use superclaude_providers::{
    Capability, ChatParams, ChatRequest, ChatResponse, Message, ModelDescriptor, ProviderError,
    Role,
};
pub use superclaude_util::error::RouterError;
