//! Multi-provider search failover with health tracking and adaptive ordering.
//!
//! Resolves a query by:
//! - Trying providers in the current preference order
//! - Skipping providers disabled for the session
//! - Demoting on failures and disabling after repeated rate-limit/auth errors
//! - Promoting a provider one place forward each time it succeeds
//! - Falling back to a keyless provider when everything else is exhausted

use super::rate_limiter::RequestRateLimiter;
use super::{SearchHit, SearchProvider};
use crate::config::SearchConfig;
use crate::error::{ProviderError, ProviderErrorKind, ResearchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Provider State
// ---------------------------------------------------------------------------

/// Health of a provider as seen by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    Healthy,
    /// Recent transient or auth failure; still tried.
    Degraded,
    /// Last call was rate limited; still tried.
    RateLimited,
    /// Never tried again this session.
    Disabled,
}

impl fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderHealth::Healthy => "healthy",
            ProviderHealth::Degraded => "degraded",
            ProviderHealth::RateLimited => "rate-limited",
            ProviderHealth::Disabled => "disabled",
        };
        f.write_str(label)
    }
}

/// Per-provider bookkeeping. Mutated only by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderState {
    pub name: String,
    pub health: ProviderHealth,
    pub consecutive_failures: u32,
    /// Consecutive rate-limit/auth failures; only these count toward disabling.
    #[serde(default)]
    pub limit_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    /// Soft penalty counter for `EmptyResult` outcomes.
    pub empty_results: u32,
    pub requires_credentials: bool,
}

impl ProviderState {
    fn new(name: &str, requires_credentials: bool) -> Self {
        Self {
            name: name.to_string(),
            health: ProviderHealth::Healthy,
            consecutive_failures: 0,
            limit_failures: 0,
            last_success: None,
            empty_results: 0,
            requires_credentials,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.health != ProviderHealth::Disabled
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.limit_failures = 0;
        self.health = ProviderHealth::Healthy;
        self.last_success = Some(Utc::now());
    }

    /// Apply a failed call. `can_disable` is false for the keyless fallback.
    fn record_failure(&mut self, error: &ProviderError, disable_after: u32, can_disable: bool) {
        match error.kind {
            ProviderErrorKind::EmptyResult => {
                self.empty_results += 1;
                debug!(provider = %self.name, empty_results = self.empty_results, "Provider returned no results");
            }
            ProviderErrorKind::RateLimited | ProviderErrorKind::AuthError => {
                self.consecutive_failures += 1;
                self.limit_failures += 1;
                if can_disable && self.limit_failures >= disable_after {
                    self.health = ProviderHealth::Disabled;
                    warn!(
                        provider = %self.name,
                        failures = self.limit_failures,
                        error = %error,
                        "Provider disabled for the rest of the session"
                    );
                } else {
                    self.health = if error.kind == ProviderErrorKind::RateLimited {
                        ProviderHealth::RateLimited
                    } else {
                        ProviderHealth::Degraded
                    };
                    warn!(
                        provider = %self.name,
                        failures = self.consecutive_failures,
                        error = %error,
                        "Provider demoted"
                    );
                }
            }
            ProviderErrorKind::NetworkError => {
                self.consecutive_failures += 1;
                self.health = ProviderHealth::Degraded;
                warn!(provider = %self.name, error = %error, "Transient provider failure");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunables for a `ProviderFallbackChain`.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    /// Consecutive rate-limit/auth failures before a provider is disabled.
    pub disable_after: u32,
    /// Timeout applied to every provider call.
    pub call_timeout: Duration,
    /// Requests per minute across the chain (0 = unlimited).
    pub requests_per_minute: usize,
    /// Results requested from providers added without an explicit limit.
    pub max_results: usize,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            disable_after: 2,
            call_timeout: Duration::from_secs(15),
            requests_per_minute: 0,
            max_results: 10,
        }
    }
}

impl From<&SearchConfig> for ChainSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            disable_after: config.disable_after.max(1),
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
            requests_per_minute: config.requests_per_minute,
            max_results: config.max_results,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider Slot
// ---------------------------------------------------------------------------

struct ProviderSlot {
    provider: Arc<dyn SearchProvider>,
    state: ProviderState,
    limit: usize,
}

impl ProviderSlot {
    fn new(provider: Arc<dyn SearchProvider>, limit: usize) -> Self {
        let state = ProviderState::new(provider.name(), provider.requires_credentials());
        Self {
            provider,
            state,
            limit,
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderFallbackChain
// ---------------------------------------------------------------------------

/// Ordered search providers with failover, owned by one research session.
pub struct ProviderFallbackChain {
    slots: Vec<ProviderSlot>,
    fallback: Option<ProviderSlot>,
    settings: ChainSettings,
    limiter: RequestRateLimiter,
}

impl ProviderFallbackChain {
    pub fn new(settings: ChainSettings) -> Self {
        let limiter = RequestRateLimiter::per_minute(settings.requests_per_minute);
        Self {
            slots: Vec::new(),
            fallback: None,
            settings,
            limiter,
        }
    }

    /// Append a provider at the end of the preference order.
    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        let limit = self.settings.max_results;
        self.add_provider(provider, limit);
        self
    }

    /// Install the always-enabled, lowest-priority keyless provider.
    pub fn with_fallback(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        let limit = self.settings.max_results;
        self.set_fallback(provider, limit);
        self
    }

    /// Append a provider requesting `limit` results per query.
    ///
    /// A provider that needs a credential it does not have is disabled here,
    /// before any call is made.
    pub fn add_provider(&mut self, provider: Arc<dyn SearchProvider>, limit: usize) {
        let mut slot = ProviderSlot::new(provider, limit);
        if slot.provider.requires_credentials() && !slot.provider.is_configured() {
            slot.state.health = ProviderHealth::Disabled;
            info!(provider = %slot.state.name, "Provider disabled at startup: no credential configured");
        }
        self.slots.push(slot);
    }

    pub fn set_fallback(&mut self, provider: Arc<dyn SearchProvider>, limit: usize) {
        self.fallback = Some(ProviderSlot::new(provider, limit));
    }

    /// Resolve `query` to a non-empty list of hits.
    ///
    /// Fails with `AllProvidersExhausted` only after the keyless fallback has
    /// also failed. Never retries beyond one pass.
    pub async fn resolve(&mut self, query: &str) -> Result<Vec<SearchHit>, ResearchError> {
        for idx in 0..self.slots.len() {
            if !self.slots[idx].state.is_enabled() {
                continue;
            }
            let provider = self.slots[idx].provider.clone();
            let limit = self.slots[idx].limit;

            self.limiter.acquire().await;
            match call_provider(&provider, query, limit, self.settings.call_timeout).await {
                Ok(hits) => {
                    self.slots[idx].state.record_success();
                    debug!(provider = provider.name(), hits = hits.len(), "Search succeeded");
                    self.promote(idx);
                    return Ok(hits);
                }
                Err(e) => {
                    self.slots[idx]
                        .state
                        .record_failure(&e, self.settings.disable_after, true);
                }
            }
        }

        if let Some(provider) = self.fallback.as_ref().map(|s| s.provider.clone()) {
            let limit = self.fallback.as_ref().map_or(0, |s| s.limit);
            info!(provider = provider.name(), query, "Falling back to keyless provider");
            self.limiter.acquire().await;
            let outcome = call_provider(&provider, query, limit, self.settings.call_timeout).await;
            if let Some(slot) = self.fallback.as_mut() {
                match outcome {
                    Ok(hits) => {
                        slot.state.record_success();
                        return Ok(hits);
                    }
                    Err(e) => slot
                        .state
                        .record_failure(&e, self.settings.disable_after, false),
                }
            }
        }

        warn!(query, "All search providers exhausted");
        Err(ResearchError::AllProvidersExhausted {
            query: query.to_string(),
        })
    }

    /// Swap the provider at `idx` with the nearest enabled provider ahead of it.
    fn promote(&mut self, idx: usize) {
        if let Some(ahead) = (0..idx).rev().find(|&j| self.slots[j].state.is_enabled()) {
            debug!(
                provider = %self.slots[idx].state.name,
                past = %self.slots[ahead].state.name,
                "Promoting provider"
            );
            self.slots.swap(ahead, idx);
        }
    }

    /// Snapshot of every provider's state, preference order first, fallback last.
    pub fn states(&self) -> Vec<ProviderState> {
        self.slots
            .iter()
            .chain(self.fallback.iter())
            .map(|s| s.state.clone())
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<&ProviderState> {
        self.slots
            .iter()
            .chain(self.fallback.iter())
            .map(|s| &s.state)
            .find(|s| s.name == name)
    }

    /// Current preference order, excluding the fallback.
    pub fn order(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.state.name.as_str()).collect()
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_ref().map(|s| s.state.name.as_str())
    }

    /// Providers that can still be selected, fallback included.
    pub fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_enabled()).count() + self.fallback.iter().count()
    }

    pub fn len(&self) -> usize {
        self.slots.len() + self.fallback.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One bounded provider call. Timeouts become network errors and an empty
/// `Ok` becomes `EmptyResult`.
async fn call_provider(
    provider: &Arc<dyn SearchProvider>,
    query: &str,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<SearchHit>, ProviderError> {
    match tokio::time::timeout(timeout, provider.search(query, limit)).await {
        Ok(Ok(hits)) if hits.is_empty() => Err(ProviderError::empty(provider.name())),
        Ok(Ok(mut hits)) => {
            hits.truncate(limit.max(1));
            Ok(hits)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ProviderError::network(
            provider.name(),
            format!("timed out after {}s", timeout.as_secs_f32()),
        )),
    }
}
