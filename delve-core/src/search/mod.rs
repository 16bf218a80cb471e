//! Web search abstraction.
//!
//! A `SearchProvider` wraps one search API. The `ProviderFallbackChain`
//! orders providers, tracks their health, and fails over between them.
//! Concrete HTTP clients live in the `delve-tools` crate.

pub mod chain;
pub mod rate_limiter;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chain::{ChainSettings, ProviderFallbackChain, ProviderHealth, ProviderState};
pub use rate_limiter::RequestRateLimiter;

/// One candidate result returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider that produced the hit.
    pub provider: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            provider: provider.into(),
        }
    }
}

/// A single web search backend.
///
/// `search` must report "no results" as `ProviderErrorKind::EmptyResult`
/// rather than an empty `Ok`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable lowercase identifier, e.g. "brave".
    fn name(&self) -> &str;

    /// Whether the provider needs an API key.
    fn requires_credentials(&self) -> bool {
        true
    }

    /// Whether the provider has what it needs to run (credential present).
    fn is_configured(&self) -> bool {
        true
    }

    /// Search for `query`, returning at most `limit` hits in rank order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError>;
}
