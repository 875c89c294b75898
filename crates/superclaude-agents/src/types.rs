//! Agent metadata.

use serde::{Deserialize, Serialize};

/// A named persona. Stateless; selected, never instantiated per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Tie-break weight; higher wins.
    #[serde(default)]
    pub priority: u32,
}

impl Agent {
    /// The built-in fallback persona returned when nothing scores above
    /// the selection threshold. Always available even with an empty
    /// registry.
    #[must_use]
    pub fn general_purpose() -> Self {
        Self {
            id: crate::FALLBACK_AGENT_ID.to_string(),
            category: "general".to_string(),
            description: "General-purpose agent for tasks without a specialist match".to_string(),
            triggers: Vec::new(),
            tools: vec![
                "read".to_string(),
                "write".to_string(),
                "edit".to_string(),
                "grep".to_string(),
                "bash".to_string(),
            ],
            domains: Vec::new(),
            languages: Vec::new(),
            frameworks: Vec::new(),
            priority: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_agent_parses_with_defaults() {
        let agent: Agent = serde_yaml::from_str(
            r"
id: security-engineer
category: security
description: Threat modeling and secure code review
triggers: [security, vulnerability, auth]
",
        )
        .unwrap();
        assert_eq!(agent.id, "security-engineer");
        assert_eq!(agent.triggers.len(), 3);
        assert!(agent.tools.is_empty());
        assert_eq!(agent.priority, 0);
    }

    #[test]
    fn fallback_agent_has_expected_id() {
        let fallback = Agent::general_purpose();
        assert_eq!(fallback.id, "general-purpose");
        assert!(fallback.tools.contains(&"bash".to_string()));
    }
}
