//! Brave Search web API.

use super::{finish, hit, require_key, send_json, str_field};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const NAME: &str = "brave";
/// Largest `count` the API accepts.
const MAX_COUNT: usize = 20;

pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl BraveSearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let key = require_key(NAME, &self.api_key)?;
        let count = limit.clamp(1, MAX_COUNT).to_string();
        let request = self
            .client
            .get(ENDPOINT)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key);

        let body = send_json(NAME, request).await?;
        finish(NAME, parse_response(&body), limit)
    }
}

/// Map `web.results[]` to hits.
pub fn parse_response(body: &serde_json::Value) -> Vec<SearchHit> {
    body.pointer("/web/results")
        .and_then(|v| v.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| {
                    hit(
                        NAME,
                        str_field(r, "title"),
                        str_field(r, "url"),
                        str_field(r, "description"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
