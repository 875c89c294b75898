//! Google Gemini generateContent adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use superclaude_config::ProviderSection;
use superclaude_util::error::ProviderError;

use crate::http_client::HttpClient;
use crate::types::{ChatRequest, ChatResponse, Message, ModelDescriptor, ProviderAdapter, Role};

const PROVIDER: &str = "google";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug)]
pub(crate) struct GoogleAdapter {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl GoogleAdapter {
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

    /// Gemini separates system instructions from conversation contents, and
    /// names the assistant role `model`.
    fn convert_messages(messages: &[Message]) -> (Option<WireContent>, Vec<WireContent>) {
        let mut system_parts: Vec<WirePart> = Vec::new();
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(WirePart {
                    text: msg.content.clone(),
                }),
                Role::User => contents.push(WireContent {
                    role: Some("user".to_string()),
                    parts: vec![WirePart {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => contents.push(WireContent {
                    role: Some("model".to_string()),
                    parts: vec![WirePart {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(WireContent {
                role: None,
                parts: system_parts,
            })
        };

        (system, contents)
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
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
            "invoking google adapter"
        );

        let (system_instruction, contents) = Self::convert_messages(&request.messages);
        let body = WireRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: request.params.max_tokens,
                temperature: request.params.temperature,
                stop_sequences: if request.params.stop_sequences.is_empty() {
                    None
                } else {
                    Some(request.params.stop_sequences.clone())
                },
            },
        };

        let url = format!("{}/{}:generateContent", self.base_url, descriptor.model_id);
        let builder = reqwest::Client::new()
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let candidate = wire
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadRequest {
                provider: PROVIDER.to_string(),
                message: "response contained no candidates".to_string(),
            })?;

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let mut out = ChatResponse::new(text);
        out.stop_reason = candidate.finish_reason;
        if let Some(usage) = wire.usage_metadata {
            out.tokens_in = Some(usage.prompt_token_count);
            out.tokens_out = Some(usage.candidates_token_count);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize)]
struct WirePart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_role_maps_to_model() {
        let (system, contents) = GoogleAdapter::convert_messages(&[
            Message::system("sys"),
            Message::user("q"),
            Message::assistant("a"),
        ]);
        assert!(system.is_some());
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn response_parse_joins_parts() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 2}
        }))
        .unwrap();

        let candidate = wire.candidates.into_iter().next().unwrap();
        let text: String = candidate
            .content
            .unwrap()
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        assert_eq!(text, "Hello");
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
    }
}
