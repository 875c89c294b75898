//! Tier-based model selection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use superclaude_config::{EngineConfig, ModelEntry, ProviderSection};
use superclaude_providers::{
    Capability, ChatRequest, ChatResponse, ModelDescriptor, ProviderAdapter, ProviderError,
    adapter_for, key_present, offline_mode,
};
use superclaude_util::error::RouterError;

/// Well-known tier names.
pub mod tiers {
    pub const DEEP_THINKING: &str = "deep_thinking";
    pub const LONG_CONTEXT: &str = "long_context";
    pub const FAST_ITERATION: &str = "fast_iteration";
    pub const FALLBACK: &str = "fallback";
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routed {
    pub descriptor: ModelDescriptor,
    /// Tier the descriptor actually came from.
    pub tier_used: String,
    /// True when the requested tier could not be served as asked.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// Maps tiers to models and owns the adapter cache.
///
/// Selection is deterministic for a fixed environment: candidates are kept
/// sorted by priority (descending) with model-id tie-break, and
/// availability is a pure function of the environment view.
pub struct ModelRouter {
    tier_table: BTreeMap<String, Vec<ModelDescriptor>>,
    providers: BTreeMap<String, ProviderSection>,
    adapters: Mutex<BTreeMap<String, Arc<dyn ProviderAdapter>>>,
    /// When true, adapter presence in the cache defines availability
    /// (test seam; production availability is key presence).
    injected_only: bool,
}

impl ModelRouter {
    /// Build the router from configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            tier_table: build_tier_table(&config.tiers),
            providers: config.providers.clone(),
            adapters: Mutex::new(BTreeMap::new()),
            injected_only: false,
        }
    }

    /// Build a router whose adapters are supplied directly.
    ///
    /// Availability then follows the injected set instead of environment
    /// keys, letting tests exercise routing and consensus offline.
    #[must_use]
    pub fn with_adapters(
        config: &EngineConfig,
        adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        Self {
            tier_table: build_tier_table(&config.tiers),
            providers: config.providers.clone(),
            adapters: Mutex::new(adapters),
            injected_only: true,
        }
    }

    /// Is a provider currently usable?
    fn provider_available(&self, provider: &str) -> bool {
        if self.injected_only {
            return self
                .adapters
                .lock()
                .expect("adapter cache poisoned")
                .contains_key(provider);
        }
        if offline_mode() {
            return false;
        }
        self.providers
            .get(provider)
            .is_some_and(|section| key_present(provider, section))
    }

    /// Select a model for a tier.
    ///
    /// Rules, in order:
    /// 1. Highest-priority available model in the tier whose context window
    ///    covers the estimated prompt.
    /// 2. Tier has candidates but none big enough → escalate to
    ///    `long_context` (not degraded; the request simply needs room).
    /// 3. No available model in the tier → fall through to `fallback`,
    ///    marked degraded.
    /// 4. Offline mode → return the tier's top candidate, marked degraded;
    ///    the adapters will refuse, but the pipeline still runs.
    ///
    /// # Errors
    ///
    /// [`RouterError::UnknownTier`] for a tier with no table entry,
    /// [`RouterError::NoProvider`] when every rule above comes up empty.
    pub fn route(&self, tier: &str, estimated_tokens: u64) -> Result<Routed, RouterError> {
        let candidates = self
            .tier_table
            .get(tier)
            .ok_or_else(|| RouterError::UnknownTier {
                tier: tier.to_string(),
            })?;

        if offline_mode() {
            let descriptor = candidates
                .first()
                .cloned()
                .ok_or_else(|| RouterError::NoProvider {
                    tier: tier.to_string(),
                    checked: 0,
                })?;
            return Ok(Routed {
                descriptor,
                tier_used: tier.to_string(),
                degraded: true,
                degraded_reason: Some("offline mode".to_string()),
            });
        }

        // Rule 1: available and big enough, in priority order
        if let Some(descriptor) = candidates
            .iter()
            .find(|d| self.provider_available(&d.provider) && d.max_context_tokens >= estimated_tokens)
        {
            return Ok(Routed {
                descriptor: descriptor.clone(),
                tier_used: tier.to_string(),
                degraded: false,
                degraded_reason: None,
            });
        }

        // Rule 2: context overflow escalates to the long-context tier
        let any_available = candidates
            .iter()
            .any(|d| self.provider_available(&d.provider));
        if any_available && tier != tiers::LONG_CONTEXT {
            if let Some(long) = self.tier_table.get(tiers::LONG_CONTEXT)
                && let Some(descriptor) = long.iter().find(|d| {
                    self.provider_available(&d.provider)
                        && d.max_context_tokens >= estimated_tokens
                })
            {
                debug!(
                    from = tier,
                    model = %descriptor.model_id,
                    "escalating to long-context tier for prompt size"
                );
                return Ok(Routed {
                    descriptor: descriptor.clone(),
                    tier_used: tiers::LONG_CONTEXT.to_string(),
                    degraded: false,
                    degraded_reason: None,
                });
            }
        }

        // Rule 3: fall through to the fallback tier, degraded
        if tier != tiers::FALLBACK
            && let Some(fallback) = self.tier_table.get(tiers::FALLBACK)
            && let Some(descriptor) = fallback
                .iter()
                .find(|d| self.provider_available(&d.provider))
        {
            warn!(
                requested = tier,
                model = %descriptor.model_id,
                "tier unavailable, degrading to fallback"
            );
            return Ok(Routed {
                descriptor: descriptor.clone(),
                tier_used: tiers::FALLBACK.to_string(),
                degraded: true,
                degraded_reason: Some(format!("no provider available for tier '{tier}'")),
            });
        }

        Err(RouterError::NoProvider {
            tier: tier.to_string(),
            checked: candidates.len(),
        })
    }

    /// Fetch (or lazily construct) the adapter for a provider.
    pub fn adapter(&self, provider: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let mut cache = self.adapters.lock().expect("adapter cache poisoned");
        if let Some(adapter) = cache.get(provider) {
            return Ok(Arc::clone(adapter));
        }
        if self.injected_only {
            return Err(ProviderError::Unavailable {
                provider: provider.to_string(),
                message: "no adapter injected for provider".to_string(),
            });
        }
        let section = self.providers.get(provider).cloned().unwrap_or_default();
        let adapter: Arc<dyn ProviderAdapter> = Arc::from(adapter_for(provider, &section)?);
        cache.insert(provider.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Single-model path: route already happened, just call the adapter.
    pub async fn chat(
        &self,
        descriptor: &ModelDescriptor,
        request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let adapter = self.adapter(&descriptor.provider)?;
        adapter.chat(descriptor, request).await
    }

    /// Descriptors for a tier, in selection order. Empty for unknown tiers.
    #[must_use]
    pub fn tier_candidates(&self, tier: &str) -> &[ModelDescriptor] {
        self.tier_table.get(tier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Provider availability snapshot for diagnostics.
    #[must_use]
    pub fn availability(&self) -> BTreeMap<String, bool> {
        self.providers
            .keys()
            .map(|p| (p.clone(), self.provider_available(p)))
            .collect()
    }
}

/// Convert config entries into sorted descriptor lists.
fn build_tier_table(
    tiers: &BTreeMap<String, Vec<ModelEntry>>,
) -> BTreeMap<String, Vec<ModelDescriptor>> {
    tiers
        .iter()
        .map(|(name, entries)| {
            let mut descriptors: Vec<ModelDescriptor> = entries
                .iter()
                .map(|e| ModelDescriptor {
                    provider: e.provider.clone(),
                    model_id: e.model_id.clone(),
                    max_context_tokens: e.max_context_tokens,
                    capabilities: e
                        .capabilities
                        .iter()
                        .filter_map(|c| Capability::parse(c))
                        .collect(),
                    priority: e.priority,
                    cost_hint: e.cost_hint,
                })
                .collect();
            // Priority descending, then stable model-id order
            descriptors.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.model_id.cmp(&b.model_id))
            });
            (name.clone(), descriptors)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use superclaude_providers::StaticProvider;

    fn router_with(providers: &[&str]) -> ModelRouter {
        let config = EngineConfig::minimal_for_testing();
        let adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = providers
            .iter()
            .map(|p| {
                (
                    (*p).to_string(),
                    Arc::new(StaticProvider::new(*p)) as Arc<dyn ProviderAdapter>,
                )
            })
            .collect();
        ModelRouter::with_adapters(&config, adapters)
    }

    #[test]
    fn route_prefers_highest_priority_available() {
        let router = router_with(&["anthropic", "openai", "google", "xai"]);
        let routed = router.route(tiers::DEEP_THINKING, 1_000).unwrap();
        assert!(!routed.degraded);
        assert_eq!(routed.descriptor.provider, "anthropic");
        assert_eq!(routed.tier_used, tiers::DEEP_THINKING);
    }

    #[test]
    fn route_skips_unavailable_providers() {
        let router = router_with(&["openai"]);
        let routed = router.route(tiers::DEEP_THINKING, 1_000).unwrap();
        assert_eq!(routed.descriptor.provider, "openai");
        assert!(!routed.degraded);
    }

    #[test]
    fn context_overflow_escalates_to_long_context() {
        let router = router_with(&["anthropic", "google"]);
        // deep_thinking models top out at 200k in the default table
        let routed = router.route(tiers::DEEP_THINKING, 500_000).unwrap();
        assert_eq!(routed.tier_used, tiers::LONG_CONTEXT);
        assert_eq!(routed.descriptor.provider, "google");
        assert!(!routed.degraded);
    }

    #[test]
    fn empty_tier_falls_through_degraded() {
        // Only xai has an adapter; deep_thinking includes xai so it resolves,
        // but long_context has no xai entry and must degrade to fallback…
        // which also lacks xai, so routing fails
        let router = router_with(&["xai"]);
        let err = router.route(tiers::LONG_CONTEXT, 1_000).unwrap_err();
        assert!(matches!(err, RouterError::NoProvider { .. }));
    }

    #[test]
    fn degraded_fall_through_to_fallback() {
        // google only: deep_thinking has no google entry, fallback does
        let router = router_with(&["google"]);
        let routed = router.route(tiers::DEEP_THINKING, 1_000).unwrap();
        assert!(routed.degraded);
        assert_eq!(routed.tier_used, tiers::FALLBACK);
        assert_eq!(routed.descriptor.provider, "google");
        assert!(routed.degraded_reason.is_some());
    }

    #[test]
    fn unknown_tier_is_an_error() {
        let router = router_with(&["anthropic"]);
        let err = router.route("psychic", 10).unwrap_err();
        assert!(matches!(err, RouterError::UnknownTier { .. }));
    }

    #[test]
    fn tier_candidates_are_priority_sorted() {
        let router = router_with(&[]);
        let candidates = router.tier_candidates(tiers::FAST_ITERATION);
        assert!(!candidates.is_empty());
        for pair in candidates.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let router = router_with(&["anthropic", "openai"]);
        let a = router.route(tiers::DEEP_THINKING, 1_000).unwrap();
        let b = router.route(tiers::DEEP_THINKING, 1_000).unwrap();
        assert_eq!(a.descriptor.model_id, b.descriptor.model_id);
        assert_eq!(a.tier_used, b.tier_used);
    }
}
