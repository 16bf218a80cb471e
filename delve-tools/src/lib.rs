//! # Delve Tools
//!
//! HTTP integrations for Delve: search provider clients, the page fetcher
//! with HTML text extraction, and construction of the provider fallback
//! chain from configuration.

pub mod fetch;
pub mod html;
pub mod registry;
pub mod robots;
pub mod search;

pub use fetch::HttpFetcher;
pub use registry::{KNOWN_PROVIDERS, build_fallback_chain, create_search_provider};
