//! Bing Web Search v7.

use super::{finish, hit, require_key, send_json, str_field};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
const NAME: &str = "bing";
const MAX_COUNT: usize = 50;

pub struct BingSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl BingSearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for BingSearch {
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
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("freshness", "Month"),
                ("responseFilter", "Webpages"),
            ])
            .header("Ocp-Apim-Subscription-Key", key);

        let body = send_json(NAME, request).await?;
        finish(NAME, parse_response(&body), limit)
    }
}

/// Map `webPages.value[]` to hits.
pub fn parse_response(body: &serde_json::Value) -> Vec<SearchHit> {
    body.pointer("/webPages/value")
        .and_then(|v| v.as_array())
        .map(|pages| {
            pages
                .iter()
                .map(|p| {
                    hit(
                        NAME,
                        str_field(p, "name"),
                        str_field(p, "url"),
                        str_field(p, "snippet"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
