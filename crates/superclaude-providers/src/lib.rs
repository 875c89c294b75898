//! Provider adapters.
//!
//! One adapter per model provider, all implementing [`ProviderAdapter`].
//! Adapters translate the engine's uniform chat request into each
//! provider's wire format, authenticate from the environment, retry
//! transient failures with backoff, and classify every recognizable
//! non-2xx response into a typed [`ProviderError`]. Classification is the
//! contract; adapters never surface raw HTTP failures they can name.

mod anthropic;
mod google;
mod http_client;
mod openai;
mod types;
mod xai;

#[cfg(any(test, feature = "test-utils"))]
mod static_adapter;

pub use types::{
    Capability, ChatParams, ChatRequest, ChatResponse, Message, ModelDescriptor, ProviderAdapter,
    Role,
};

pub use superclaude_util::error::ProviderError;

#[cfg(any(test, feature = "test-utils"))]
pub use static_adapter::{ScriptedCall, StaticProvider};

pub(crate) use anthropic::AnthropicAdapter;
pub(crate) use google::GoogleAdapter;
pub(crate) use openai::OpenAiAdapter;
pub(crate) use xai::XaiAdapter;

use superclaude_config::ProviderSection;

/// Environment variable disabling all network calls.
pub const OFFLINE_MODE_ENV: &str = "ENGINE_OFFLINE_MODE";

/// True when the engine must not open sockets.
#[must_use]
pub fn offline_mode() -> bool {
    match std::env::var(OFFLINE_MODE_ENV) {
        Ok(v) => {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        }
        Err(_) => false,
    }
}

/// Default API key environment variable for a provider name.
#[must_use]
pub fn default_key_env(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_ascii_uppercase())
}

/// Whether a provider's key is present in the environment.
///
/// This is the availability probe the router and `doctor` use; it never
/// reads the key's value into anything that outlives the check.
#[must_use]
pub fn key_present(provider: &str, section: &ProviderSection) -> bool {
    let env = section
        .api_key_env
        .clone()
        .unwrap_or_else(|| default_key_env(provider));
    std::env::var(&env).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Construct the adapter for a named provider.
///
/// # Errors
///
/// Returns `ProviderError::Unavailable` for unknown providers and
/// `ProviderError::Auth` when the key environment variable is missing.
pub fn adapter_for(
    provider: &str,
    section: &ProviderSection,
) -> Result<Box<dyn ProviderAdapter>, ProviderError> {
    match provider {
        "anthropic" => Ok(Box::new(AnthropicAdapter::new_from_section(section)?)),
        "openai" => Ok(Box::new(OpenAiAdapter::new_from_section(section)?)),
        "google" => Ok(Box::new(GoogleAdapter::new_from_section(section)?)),
        "xai" => Ok(Box::new(XaiAdapter::new_from_section(section)?)),
        unknown => Err(ProviderError::Unavailable {
            provider: unknown.to_string(),
            message: format!(
                "unknown provider '{unknown}'; supported: anthropic, openai, google, xai"
            ),
        }),
    }
}

/// Read an adapter's API key from the environment.
pub(crate) fn load_api_key(
    provider: &str,
    section: &ProviderSection,
) -> Result<String, ProviderError> {
    let env = section
        .api_key_env
        .clone()
        .unwrap_or_else(|| default_key_env(provider));
    std::env::var(&env).map_err(|_| ProviderError::Auth {
        provider: provider.to_string(),
        message: format!("API key not found in environment variable '{env}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_env_is_uppercase_stem() {
        assert_eq!(default_key_env("anthropic"), "ANTHROPIC_API_KEY");
        assert_eq!(default_key_env("xai"), "XAI_API_KEY");
    }

    #[test]
    fn unknown_provider_is_unavailable() {
        let err = adapter_for("mystery", &ProviderSection::default()).unwrap_err();
        match err {
            ProviderError::Unavailable { message, .. } => {
                assert!(message.contains("mystery"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
