//! Error types for the Delve research core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM, search providers, page fetching, the research loop,
//! and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Context budget exceeded: used {used} of {limit} characters")]
    ContextOverflow { used: usize, limit: usize },

    #[error("Unsupported LLM provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Classification of a failed search-provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    AuthError,
    NetworkError,
    /// The provider answered but had nothing for the query.
    EmptyResult,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::RateLimited => "rate limited",
            ProviderErrorKind::AuthError => "auth error",
            ProviderErrorKind::NetworkError => "network error",
            ProviderErrorKind::EmptyResult => "empty result",
        };
        f.write_str(label)
    }
}

/// A search-provider failure. Always non-fatal to the research loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider}: {kind}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::RateLimited, message)
    }

    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::AuthError, message)
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::NetworkError, message)
    }

    pub fn empty(provider: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::EmptyResult, "no results")
    }
}

/// Errors from turning a URL into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Fetch of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContent { url: String, content_type: String },

    #[error("No readable text at {url}")]
    EmptyContent { url: String },

    #[error("Disallowed by robots.txt: {url}")]
    Disallowed { url: String },
}

/// Errors from the research loop itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResearchError {
    #[error("Planning failed: {message}")]
    PlanningFailed { message: String },

    #[error("All search providers exhausted for query '{query}'")]
    AllProvidersExhausted { query: String },

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Convenience result type for the Delve core.
pub type Result<T> = std::result::Result<T, DelveError>;
