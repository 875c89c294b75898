//! Uniform request/response shapes for provider adapters.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use superclaude_util::error::ProviderError;

/// Capabilities a model may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Thinking,
    Vision,
    Fast,
    LongContext,
}

impl Capability {
    /// Parse a capability name from configuration; unknown names are `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "thinking" => Some(Self::Thinking),
            "vision" => Some(Self::Vision),
            "fast" => Some(Self::Fast),
            "long_context" => Some(Self::LongContext),
            _ => None,
        }
    }
}

/// One routable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub model_id: String,
    pub max_context_tokens: u64,
    pub capabilities: Vec<Capability>,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_hint: Option<f64>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling and limit parameters for one call.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
    /// Per-call deadline; canceled calls surface as `Unavailable`.
    pub deadline: Duration,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
            stop_sequences: Vec::new(),
            deadline: Duration::from_secs(60),
        }
    }
}

/// The uniform request every adapter accepts.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub params: ChatParams,
}

impl ChatRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            params: ChatParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: ChatParams) -> Self {
        self.params = params;
        self
    }

    /// Rough token estimate for routing decisions (4 bytes ≈ 1 token).
    #[must_use]
    pub fn estimated_tokens(&self) -> u64 {
        let bytes: usize = self.messages.iter().map(|m| m.content.len()).sum();
        (bytes as u64) / 4 + 1
    }
}

/// The uniform response every adapter produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub stop_reason: Option<String>,
    /// Provider-specific extras, kept for evidence; redacted on write.
    #[serde(default)]
    pub raw_metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_in: None,
            tokens_out: None,
            stop_reason: None,
            raw_metadata: HashMap::new(),
        }
    }
}

/// Trait all provider adapters implement.
///
/// Adapters are safe for concurrent use; their HTTP clients hold a bounded
/// connection pool and are reused across calls.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// The provider name (`anthropic`, `openai`, …).
    fn name(&self) -> &str;

    /// Issue one chat call against the model named by `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ProviderError`]; non-2xx responses the
    /// adapter can recognize never surface as panics or opaque transport
    /// errors.
    async fn chat(
        &self,
        descriptor: &ModelDescriptor,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_parse_round_trip() {
        assert_eq!(Capability::parse("thinking"), Some(Capability::Thinking));
        assert_eq!(Capability::parse("long_context"), Some(Capability::LongContext));
        assert_eq!(Capability::parse("telepathy"), None);
    }

    #[test]
    fn token_estimate_scales_with_content() {
        let small = ChatRequest::new(vec![Message::user("hi")]);
        let large = ChatRequest::new(vec![Message::user("x".repeat(40_000))]);
        assert!(small.estimated_tokens() < 10);
        assert!(large.estimated_tokens() >= 10_000);
    }

    #[test]
    fn descriptor_capability_lookup() {
        let descriptor = ModelDescriptor {
            provider: "anthropic".into(),
            model_id: "claude-opus-4".into(),
            max_context_tokens: 200_000,
            capabilities: vec![Capability::Thinking],
            priority: 10,
            cost_hint: None,
        };
        assert!(descriptor.has_capability(Capability::Thinking));
        assert!(!descriptor.has_capability(Capability::Vision));
    }
}
