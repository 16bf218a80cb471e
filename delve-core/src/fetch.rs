//! The page-fetch capability used by the research loop.
//!
//! A `Fetcher` turns a URL into readable text. The HTTP implementation lives
//! in `delve-tools`; the loop only depends on this trait.

use crate::error::FetchError;
use async_trait::async_trait;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` and return its extracted, human-readable text.
    ///
    /// Every failure is per-URL and non-fatal to the caller.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
