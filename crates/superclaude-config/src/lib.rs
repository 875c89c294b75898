//! Configuration for the superclaude engine.
//!
//! Hierarchical configuration with discovery and precedence: request
//! overrides > environment > config file > built-in defaults. The config
//! file is `.superclaude/config.toml`, discovered by walking up from the
//! working directory. Every duration knob is clamped to a hard cap;
//! iteration ceilings can never be raised past [`limits::HARD_MAX_ITERATIONS`].

mod discovery;
mod model;

pub mod limits;

pub use model::*;
