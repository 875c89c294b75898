//! xAI adapter. OpenAI-compatible surface behind api.x.ai.

use async_trait::async_trait;

use superclaude_config::ProviderSection;
use superclaude_util::error::ProviderError;

use crate::http_client::HttpClient;
use crate::openai::chat_completions;
use crate::types::{ChatRequest, ChatResponse, ModelDescriptor, ProviderAdapter};

const PROVIDER: &str = "xai";
const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1/chat/completions";

#[derive(Debug)]
pub(crate) struct XaiAdapter {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl XaiAdapter {
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
impl ProviderAdapter for XaiAdapter {
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
