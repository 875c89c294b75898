//! Command data shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A parsed, validated invocation. Immutable after parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub namespace: String,
    pub name: String,
    pub args: Vec<String>,
    pub flags: BTreeMap<String, FlagValue>,
    pub raw_text: String,
}

/// A flag's typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl FlagValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The type a flag accepts, from the command's flag specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FlagType {
    /// Presence-only; never takes a value.
    Bool,
    /// Free-form text value.
    Text,
    /// Integer value.
    Number,
    /// Text restricted to an allowed set.
    Choice { allowed: Vec<String> },
}

/// Specification of one flag a command accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub name: String,
    /// Single-character short form (`-f`).
    #[serde(default)]
    pub short: Option<char>,
    #[serde(flatten)]
    pub kind: FlagType,
    /// Default applied when the flag is absent.
    #[serde(default)]
    pub default: Option<FlagValue>,
    #[serde(default)]
    pub description: String,
}

/// Coarse complexity classification of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// What a command is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Expectations {
    #[serde(default)]
    pub expects_file_changes: bool,
    #[serde(default)]
    pub expects_tests: bool,
    #[serde(default)]
    pub requires_diff: bool,
}

/// Metadata carried by a command file's frontmatter. The file body (the
/// command playbook prompt) is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMetadata {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub personas: Vec<String>,
    #[serde(default)]
    pub flags_spec: Vec<FlagSpec>,
    #[serde(default)]
    pub requires_evidence: bool,
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default)]
    pub expectations: Expectations,
}

fn default_namespace() -> String {
    "sc".to_string()
}

impl CommandMetadata {
    /// Find a flag spec by long name.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&FlagSpec> {
        self.flags_spec.iter().find(|f| f.name == name)
    }

    /// Find a flag spec by short form.
    #[must_use]
    pub fn flag_by_short(&self, short: char) -> Option<&FlagSpec> {
        self.flags_spec.iter().find(|f| f.short == Some(short))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_parses_from_frontmatter_yaml() {
        let metadata: CommandMetadata = serde_yaml::from_str(
            r#"
name: implement
category: engineering
description: Implement a feature with validation and quality gates
complexity: high
requires_evidence: true
flags_spec:
  - name: consensus
    type: bool
    short: c
  - name: iterations
    type: number
    default: 3
  - name: tier
    type: choice
    allowed: [deep_thinking, fast_iteration]
    default: deep_thinking
expectations:
  expects_file_changes: true
  expects_tests: true
  requires_diff: true
"#,
        )
        .unwrap();

        assert_eq!(metadata.name, "implement");
        assert_eq!(metadata.namespace, "sc");
        assert_eq!(metadata.complexity, Complexity::High);
        assert!(metadata.requires_evidence);
        assert_eq!(metadata.flags_spec.len(), 3);
        assert_eq!(metadata.flag_by_short('c').unwrap().name, "consensus");
        assert!(matches!(
            metadata.flag("tier").unwrap().kind,
            FlagType::Choice { .. }
        ));
        assert_eq!(
            metadata.flag("iterations").unwrap().default,
            Some(FlagValue::Number(3))
        );
        assert!(metadata.expectations.requires_diff);
    }

    #[test]
    fn flag_value_accessors() {
        assert_eq!(FlagValue::Bool(true).as_bool(), Some(true));
        assert_eq!(FlagValue::Number(7).as_i64(), Some(7));
        assert_eq!(FlagValue::Text("x".into()).as_str(), Some("x"));
        assert_eq!(FlagValue::Text("x".into()).as_bool(), None);
    }
}
