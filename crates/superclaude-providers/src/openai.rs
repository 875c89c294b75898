//! OpenAI chat-completions adapter.
//!
//! The wire structs are shared with the xAI adapter, which speaks the same
//! surface behind a different host and key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use superclaude_config::ProviderSection;
use superclaude_util::error::ProviderError;

use crate::http_client::HttpClient;
use crate::types::{ChatRequest, ChatResponse, ModelDescriptor, ProviderAdapter, Role};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug)]
pub(crate) struct OpenAiAdapter {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub(crate) fn new_from_section(section: &ProviderSection) -> Result<Self, ProviderError> {
        let api_key = crate::load_api_key(PROVIDER, section)?;
        Ok(Self {
            client: HttpClient::new()?,
            base_url: section
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(
        &self,
        descriptor: &ModelDescriptor,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        chat_completions(
            &self.client,
            &self.base_url,
            &self.api_key,
            PROVIDER,
            descriptor,
            request,
        )
        .await
    }
}

/// Shared OpenAI-compatible chat call (OpenAI, xAI).
pub(crate) async fn chat_completions(
    client: &HttpClient,
    base_url: &str,
    api_key: &str,
    provider: &'static str,
    descriptor: &ModelDescriptor,
    request: ChatRequest,
) -> Result<ChatResponse, ProviderError> {
    if crate::offline_mode() {
        return Err(ProviderError::Unavailable {
            provider: provider.to_string(),
            message: "offline mode is enabled".to_string(),
        });
    }

    debug!(
        provider,
        model = %descriptor.model_id,
        max_tokens = request.params.max_tokens,
        "invoking chat-completions adapter"
    );

    let messages = request
        .messages
        .iter()
        .map(|m| WireMessage {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        })
        .collect();

    let body = WireRequest {
        model: descriptor.model_id.clone(),
        messages,
        max_tokens: request.params.max_tokens,
        temperature: request.params.temperature,
        stop: if request.params.stop_sequences.is_empty() {
            None
        } else {
            Some(request.params.stop_sequences.clone())
        },
    };

    let builder = reqwest::Client::new()
        .post(base_url)
        .bearer_auth(api_key)
        .header("content-type", "application/json")
        .json(&body);

    let response = client
        .execute_with_retry(builder, request.params.deadline, provider)
        .await?;

    let wire: WireResponse = response.json().await.map_err(|e| ProviderError::Network {
        provider: provider.to_string(),
        message: client.redact(&format!("failed to parse response: {e}")),
    })?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::BadRequest {
            provider: provider.to_string(),
            message: "response contained no choices".to_string(),
        })?;

    let mut out = ChatResponse::new(choice.message.content.unwrap_or_default());
    out.stop_reason = choice.finish_reason;
    if let Some(usage) = wire.usage {
        out.tokens_in = Some(usage.prompt_tokens);
        out.tokens_out = Some(usage.completion_tokens);
    }
    out.raw_metadata
        .insert("model".to_string(), serde_json::Value::String(wire.model));
    Ok(out)
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parse_extracts_first_choice() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4.1",
            "choices": [
                {"message": {"content": "answer"}, "finish_reason": "stop"},
                {"message": {"content": "alt"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 9, "completion_tokens": 4}
        }))
        .unwrap();

        let first = wire.choices.into_iter().next().unwrap();
        assert_eq!(first.message.content.as_deref(), Some("answer"));
        assert_eq!(first.finish_reason.as_deref(), Some("stop"));
        assert_eq!(wire.usage.unwrap().prompt_tokens, 9);
    }

    #[test]
    fn empty_choices_parse_cleanly() {
        let wire: WireResponse =
            serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(wire.choices.is_empty());
    }
}
