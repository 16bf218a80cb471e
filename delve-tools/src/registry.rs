//! Builds search providers and the fallback chain from configuration.

use crate::search::{
    ArxivSearch, BingSearch, BraveSearch, DuckDuckGoSearch, ExaSearch, TavilySearch, http_client,
};
use delve_core::config::SearchConfig;
use delve_core::search::{ChainSettings, ProviderFallbackChain, SearchProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every provider name `create_search_provider` understands.
pub const KNOWN_PROVIDERS: [&str; 6] = ["brave", "exa", "bing", "tavily", "arxiv", "duckduckgo"];

/// The keyless provider installed as the chain's last resort.
pub const FALLBACK_PROVIDER: &str = "duckduckgo";

const USER_AGENT: &str = concat!("Delve/", env!("CARGO_PKG_VERSION"));

/// Create the provider called `name`, or `None` for an unknown name.
///
/// Credentials are resolved from the provider's settings; a keyed provider
/// without one is still created and reports `is_configured() == false`.
pub fn create_search_provider(
    name: &str,
    config: &SearchConfig,
    client: &reqwest::Client,
) -> Option<Arc<dyn SearchProvider>> {
    let key = config.settings(name).resolve_api_key();
    let client = client.clone();
    let provider: Arc<dyn SearchProvider> = match name {
        "brave" => Arc::new(BraveSearch::new(client, key)),
        "exa" => Arc::new(ExaSearch::new(client, key)),
        "bing" => Arc::new(BingSearch::new(client, key)),
        "tavily" => Arc::new(TavilySearch::new(client, key)),
        "arxiv" => Arc::new(ArxivSearch::new(client)),
        "duckduckgo" => Arc::new(DuckDuckGoSearch::new(client)),
        _ => return None,
    };
    Some(provider)
}

/// The chain's provider names in order: default provider first, then the
/// fallback order, without duplicates, unknown names, disabled providers
/// or the dedicated fallback.
pub fn chain_order(config: &SearchConfig) -> Vec<String> {
    config
        .preference_order()
        .into_iter()
        .filter(|name| {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                warn!(provider = %name, "Unknown search provider in configuration, skipping");
                return false;
            }
            if !config.settings(name).enabled {
                debug!(provider = %name, "Provider disabled in configuration");
                return false;
            }
            name != FALLBACK_PROVIDER
        })
        .collect()
}

/// Build the session's fallback chain from configuration.
pub fn build_fallback_chain(config: &SearchConfig) -> reqwest::Result<ProviderFallbackChain> {
    let settings = ChainSettings::from(config);
    let client = http_client(settings.call_timeout, USER_AGENT)?;
    let mut chain = ProviderFallbackChain::new(settings);

    for name in chain_order(config) {
        if let Some(provider) = create_search_provider(&name, config, &client) {
            chain.add_provider(provider, config.max_results_for(&name).max(1));
        }
    }
    if let Some(fallback) = create_search_provider(FALLBACK_PROVIDER, config, &client) {
        chain.set_fallback(fallback, config.max_results_for(FALLBACK_PROVIDER).max(1));
    }

    info!(
        order = ?chain.order(),
        enabled = chain.enabled_count(),
        "Search provider chain ready"
    );
    Ok(chain)
}
