//! Agent personas: discovery, registry, and selection.
//!
//! Agents are stateless named personas described by Markdown files with
//! YAML frontmatter; the body (the persona prompt) is opaque to the engine.
//! The registry discovers them from configured directories and keeps a
//! bounded in-memory cache; the selector scores them against a task
//! context and always returns something: the `general-purpose` fallback
//! when nothing clears the threshold.

mod context;
mod registry;
mod selector;
mod types;

pub use context::TaskContext;
pub use registry::AgentRegistry;
pub use selector::{Selection, SelectionFilters, select};
pub use types::Agent;

pub use superclaude_util::error::RegistryError;

/// Id of the always-present fallback agent.
pub const FALLBACK_AGENT_ID: &str = "general-purpose";

/// Rationale marker for fallback selections.
pub const FALLBACK_RATIONALE: &str = "fallback";
