//! Shared foundations for the superclaude engine workspace.
//!
//! This crate holds the pieces every other crate leans on: the error
//! taxonomy, exit-code mapping, atomic file writes, run identifiers,
//! on-disk layout helpers, and tracing initialization.

pub mod atomic_write;
pub mod error;
pub mod exit_codes;
pub mod frontmatter;
pub mod ids;
pub mod logging;
pub mod paths;
