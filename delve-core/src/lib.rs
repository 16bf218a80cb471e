//! # Delve Core
//!
//! Core library for Delve, an iterative web research assistant.
//! Provides the research session engine, the LLM interface (brain),
//! search provider failover, the evidence store, configuration, and
//! fundamental types. Concrete search and fetch clients live in
//! `delve-tools`.

pub mod brain;
pub mod config;
pub mod error;
pub mod fetch;
pub mod persistence;
pub mod providers;
pub mod research;
pub mod search;
pub mod text;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{DelveConfig, LlmConfig, ResearchConfig, ScraperConfig, SearchConfig};
pub use error::{
    DelveError, FetchError, LlmError, ProviderError, ProviderErrorKind, ResearchError, Result,
};
pub use fetch::Fetcher;
pub use research::{
    Command, CommandGate, ConversationEngine, CycleController, ResearchCallback, SessionState,
    StopReason,
};
pub use search::{ProviderFallbackChain, SearchHit, SearchProvider};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
