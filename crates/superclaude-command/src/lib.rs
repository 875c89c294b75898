//! Command grammar and registry.
//!
//! The textual surface is `/<namespace>:<name> [flags] [positional]`, with
//! boolean (`--flag`), short (`-f`), and value (`--key=value`,
//! `--key value`) flag forms. The registry discovers command files
//! (frontmatter metadata, opaque prompt body) and validates parsed
//! invocations against each command's flag specification.

mod parser;
mod registry;
mod types;

pub use parser::{RawInvocation, format_command, parse_raw};
pub use registry::CommandRegistry;
pub use types::{
    Command, CommandMetadata, Complexity, Expectations, FlagSpec, FlagType, FlagValue,
};

pub use superclaude_util::error::ParseError;

/// Namespaces the engine accepts.
pub const KNOWN_NAMESPACES: &[&str] = &["sc"];
