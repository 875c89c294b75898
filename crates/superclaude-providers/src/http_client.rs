//! Shared HTTP client for the provider adapters.
//!
//! One `reqwest::Client` per adapter, rustls TLS, bounded connection pool,
//! and a retry policy for transient failures: up to 3 attempts total on
//! 5xx/network errors with exponential backoff plus deterministic jitter.
//! 4xx responses are classified and never retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use superclaude_redaction::SecretRedactor;
use superclaude_util::error::ProviderError;

/// Ceiling applied to any per-request timeout.
const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Connect timeout for new connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Total attempts for 5xx and network failures (1 initial + 2 retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff; attempt n sleeps `base * 2^(n-1)` plus jitter.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    redactor: Arc<SecretRedactor>,
}

impl HttpClient {
    pub(crate) fn new() -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .use_rustls_tls()
            .build()
            .map_err(|e| ProviderError::Unavailable {
                provider: "http".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client: Arc::new(client),
            redactor: Arc::new(SecretRedactor::new()),
        })
    }

    /// Execute a request with timeout, classification, and retry.
    pub(crate) async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        deadline: Duration,
        provider: &str,
    ) -> Result<Response, ProviderError> {
        let effective_timeout = deadline.min(MAX_HTTP_TIMEOUT);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| ProviderError::Network {
                    provider: provider.to_string(),
                    message: "failed to clone request for retry".to_string(),
                })?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| ProviderError::Network {
                    provider: provider.to_string(),
                    message: format!("failed to build request: {e}"),
                })?;

            debug!(
                provider,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "executing provider request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(classify_client_error(status, provider));
                    }

                    if status.is_server_error() {
                        if attempt < MAX_ATTEMPTS {
                            warn!(
                                provider,
                                attempt,
                                status = status.as_u16(),
                                "server error, will retry"
                            );
                            tokio::time::sleep(backoff_for(provider, attempt)).await;
                            continue;
                        }
                        return Err(ProviderError::Unavailable {
                            provider: provider.to_string(),
                            message: format!("server error {status} after {attempt} attempts"),
                        });
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(ProviderError::deadline(provider, effective_timeout));
                    }

                    if attempt < MAX_ATTEMPTS {
                        warn!(provider, attempt, error = %e, "network error, will retry");
                        tokio::time::sleep(backoff_for(provider, attempt)).await;
                        continue;
                    }

                    return Err(ProviderError::Network {
                        provider: provider.to_string(),
                        message: self.redactor.redact_text(&e.to_string()),
                    });
                }
            }
        }
    }

    /// Redact a provider-supplied error body before it leaves the adapter.
    pub(crate) fn redact(&self, message: &str) -> String {
        self.redactor.redact_text(message)
    }
}

/// Map 4xx status codes to typed errors. Never retried.
fn classify_client_error(status: StatusCode, provider: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
            provider: provider.to_string(),
            message: format!("authentication failed: {status}"),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimit {
            provider: provider.to_string(),
            message: format!("rate limit exceeded: {status}"),
        },
        _ => ProviderError::BadRequest {
            provider: provider.to_string(),
            message: format!("request rejected: {status}"),
        },
    }
}

/// Exponential backoff with deterministic jitter.
///
/// The jitter is a hash of `(provider, attempt)` folded into 0..250ms, so
/// retry schedules are reproducible in tests while concurrent voters still
/// spread their retries.
fn backoff_for(provider: &str, attempt: u32) -> Duration {
    let exponential = INITIAL_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1));
    let mut hasher = blake3::Hasher::new();
    hasher.update(provider.as_bytes());
    hasher.update(&attempt.to_le_bytes());
    let digest = hasher.finalize();
    let jitter_ms = u64::from(digest.as_bytes()[0]) % 250;
    exponential + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_401_and_403_as_auth() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            match classify_client_error(status, "anthropic") {
                ProviderError::Auth { provider, message } => {
                    assert_eq!(provider, "anthropic");
                    assert!(message.contains("authentication"));
                }
                other => panic!("expected Auth for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn classify_429_as_rate_limit() {
        match classify_client_error(StatusCode::TOO_MANY_REQUESTS, "openai") {
            ProviderError::RateLimit { message, .. } => {
                assert!(message.contains("rate limit"));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn classify_other_4xx_as_bad_request() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(matches!(
                classify_client_error(status, "google"),
                ProviderError::BadRequest { .. }
            ));
        }
    }

    #[test]
    fn backoff_grows_exponentially_with_bounded_jitter() {
        let a1 = backoff_for("anthropic", 1);
        let a2 = backoff_for("anthropic", 2);
        assert!(a1 >= Duration::from_secs(1) && a1 < Duration::from_millis(1250));
        assert!(a2 >= Duration::from_secs(2) && a2 < Duration::from_millis(2250));
    }

    #[test]
    fn backoff_jitter_is_deterministic() {
        assert_eq!(backoff_for("anthropic", 1), backoff_for("anthropic", 1));
        // Different providers spread out
        let spread: std::collections::HashSet<Duration> = ["anthropic", "openai", "google", "xai"]
            .iter()
            .map(|p| backoff_for(p, 1))
            .collect();
        assert!(spread.len() > 1);
    }
}
