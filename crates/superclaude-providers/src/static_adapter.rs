//! Scripted adapter for tests.
//!
//! Lets executor and loop tests run fully offline: each call pops the next
//! scripted outcome. When the script runs dry the provider keeps returning
//! the configured fallback response.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use superclaude_util::error::ProviderError;

use crate::types::{ChatRequest, ChatResponse, ModelDescriptor, ProviderAdapter};

/// One scripted call outcome.
#[derive(Debug)]
pub enum ScriptedCall {
    Respond(ChatResponse),
    Fail(ProviderError),
}

/// A deterministic, scriptable provider.
#[derive(Debug)]
pub struct StaticProvider {
    name: String,
    script: Mutex<VecDeque<ScriptedCall>>,
    fallback_text: String,
    calls: Mutex<Vec<ChatRequest>>,
}

impl StaticProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback_text: "ok".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    /// Queue the next call's outcome.
    pub fn push(&self, call: ScriptedCall) {
        self.script.lock().expect("script poisoned").push_back(call);
    }

    /// Queue a plain text response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(ScriptedCall::Respond(ChatResponse::new(text)));
    }

    /// Number of chat calls observed so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls poisoned").len()
    }

    /// Requests observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().expect("calls poisoned").clone()
    }
}

#[async_trait]
impl ProviderAdapter for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        _descriptor: &ModelDescriptor,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        // Mirrors the production adapters' offline contract so offline
        // scenarios stay testable end to end
        if crate::offline_mode() {
            return Err(ProviderError::Unavailable {
                provider: self.name.clone(),
                message: "offline mode is enabled".to_string(),
            });
        }
        self.calls.lock().expect("calls poisoned").push(request);

        let next = self.script.lock().expect("script poisoned").pop_front();
        match next {
            Some(ScriptedCall::Respond(response)) => Ok(response),
            Some(ScriptedCall::Fail(err)) => Err(err),
            None => Ok(ChatResponse::new(self.fallback_text.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, Message};

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor {
            provider: "static".into(),
            model_id: "static-1".into(),
            max_context_tokens: 100_000,
            capabilities: vec![Capability::Fast],
            priority: 1,
            cost_hint: None,
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_pop_in_order() {
        let provider = StaticProvider::new("static");
        provider.push_text("first");
        provider.push(ScriptedCall::Fail(ProviderError::Unavailable {
            provider: "static".into(),
            message: "down".into(),
        }));

        let req = ChatRequest::new(vec![Message::user("hi")]);
        let first = provider.chat(&descriptor(), req.clone()).await.unwrap();
        assert_eq!(first.text, "first");

        let second = provider.chat(&descriptor(), req.clone()).await;
        assert!(second.is_err());

        // Script exhausted: fallback text
        let third = provider.chat(&descriptor(), req).await.unwrap();
        assert_eq!(third.text, "ok");
        assert_eq!(provider.call_count(), 3);
    }
}
