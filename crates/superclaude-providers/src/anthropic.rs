//! Anthropic Messages API adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use superclaude_config::ProviderSection;
use superclaude_util::error::ProviderError;

use crate::http_client::HttpClient;
use crate::types::{ChatRequest, ChatResponse, Message, ModelDescriptor, ProviderAdapter, Role};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub(crate) struct AnthropicAdapter {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl AnthropicAdapter {
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

    /// Split system messages out of the conversation; the Messages API
    /// takes them in a dedicated `system` field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut wire = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_prompt.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_prompt = Some(msg.content.clone());
                    }
                }
                Role::User => wire.push(WireMessage {
                    role: "user",
                    content: msg.content.clone(),
                }),
                Role::Assistant => wire.push(WireMessage {
                    role: "assistant",
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, wire)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(
        &self,
        descriptor: &ModelDescriptor,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        if crate::offline_mode() {
            return Err(ProviderError::Unavailable {
                provider: PROVIDER.to_string(),
                message: "offline mode is enabled".to_string(),
            });
        }

        debug!(
            provider = PROVIDER,
            model = %descriptor.model_id,
            max_tokens = request.params.max_tokens,
            "invoking anthropic adapter"
        );

        let (system, messages) = Self::convert_messages(&request.messages);
        let body = WireRequest {
            model: descriptor.model_id.clone(),
            messages,
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            system,
            stop_sequences: if request.params.stop_sequences.is_empty() {
                None
            } else {
                Some(request.params.stop_sequences.clone())
            },
        };

        let builder = reqwest::Client::new()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute_with_retry(builder, request.params.deadline, PROVIDER)
            .await?;

        let wire: WireResponse = response.json().await.map_err(|e| ProviderError::Network {
            provider: PROVIDER.to_string(),
            message: self.client.redact(&format!("failed to parse response: {e}")),
        })?;

        let text = wire
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        let mut out = ChatResponse::new(text);
        out.stop_reason = wire.stop_reason;
        if let Some(usage) = wire.usage {
            out.tokens_in = Some(usage.input_tokens);
            out.tokens_out = Some(usage.output_tokens);
        }
        out.raw_metadata
            .insert("model".to_string(), serde_json::Value::String(wire.model));
        Ok(out)
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
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
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_concatenate_into_system_field() {
        let messages = vec![
            Message::system("one"),
            Message::user("question"),
            Message::system("two"),
            Message::assistant("partial"),
        ];
        let (system, wire) = AnthropicAdapter::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("one\n\ntwo"));
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].role, "assistant");
    }

    #[test]
    fn response_text_joins_text_blocks_only() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "model": "claude-opus-4",
            "content": [
                {"type": "thinking", "text": "hmm"},
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": " world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 5}
        }))
        .unwrap();

        let text: String = wire
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(text, "Hello world");
        assert_eq!(wire.usage.unwrap().output_tokens, 5);
    }
}
