//! HTTP clients for the supported search APIs.
//!
//! Every client maps its API's response into `SearchHit`s and its failures
//! into `ProviderError`s with the same rules:
//! - 429 is `RateLimited`
//! - 401 and 403 are `AuthError`
//! - any other non-success status, a transport error or an unparsable body
//!   is `NetworkError`
//! - an empty result list is `EmptyResult`

pub mod arxiv;
pub mod bing;
pub mod brave;
pub mod duckduckgo;
pub mod exa;
pub mod tavily;

pub use arxiv::ArxivSearch;
pub use bing::BingSearch;
pub use brave::BraveSearch;
pub use duckduckgo::DuckDuckGoSearch;
pub use exa::ExaSearch;
pub use tavily::TavilySearch;

use delve_core::error::ProviderError;
use delve_core::search::SearchHit;
use delve_core::text::{collapse_whitespace, truncate_chars};
use std::time::Duration;

/// Snippets longer than this are cut.
pub const SNIPPET_CHARS: usize = 500;

/// Build the HTTP client shared by the search providers.
pub fn http_client(timeout: Duration, user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .user_agent(user_agent)
        .build()
}

/// Map a non-success HTTP status to a provider error.
pub fn classify_status(provider: &str, status: u16, body: &str) -> ProviderError {
    let detail = truncate_chars(body.trim(), 200);
    match status {
        429 => ProviderError::rate_limited(provider, format!("HTTP 429: {detail}")),
        401 | 403 => ProviderError::auth(provider, format!("HTTP {status}: {detail}")),
        _ => ProviderError::network(provider, format!("HTTP {status}: {detail}")),
    }
}

/// Send a request and read the body as text, classifying failures.
pub(crate) async fn send_text(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::network(provider, format!("request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(provider, format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(classify_status(provider, status.as_u16(), &body));
    }
    Ok(body)
}

/// Send a request and parse the body as JSON.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, ProviderError> {
    let body = send_text(provider, request).await?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::network(provider, format!("unparsable response: {e}")))
}

/// Build a hit, normalizing whitespace and cutting the snippet.
pub(crate) fn hit(provider: &str, title: &str, url: &str, snippet: &str) -> SearchHit {
    let snippet = collapse_whitespace(snippet);
    SearchHit::new(
        collapse_whitespace(title),
        url.trim(),
        truncate_chars(&snippet, SNIPPET_CHARS),
        provider,
    )
}

/// String field of a JSON object, empty when missing.
pub(crate) fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Keep hits with a usable URL, cap them at `limit`, and turn an empty list
/// into `EmptyResult`.
pub(crate) fn finish(
    provider: &str,
    hits: Vec<SearchHit>,
    limit: usize,
) -> Result<Vec<SearchHit>, ProviderError> {
    let hits: Vec<SearchHit> = hits
        .into_iter()
        .filter(|h| h.url.starts_with("http://") || h.url.starts_with("https://"))
        .take(limit)
        .collect();
    if hits.is_empty() {
        return Err(ProviderError::empty(provider));
    }
    Ok(hits)
}

/// The provider's credential, or an auth error when it is missing.
pub(crate) fn require_key<'a>(
    provider: &str,
    api_key: &'a Option<String>,
) -> Result<&'a str, ProviderError> {
    api_key
        .as_deref()
        .ok_or_else(|| ProviderError::auth(provider, "no API key configured"))
}
