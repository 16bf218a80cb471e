//! Tavily search API.

use super::{finish, hit, require_key, send_json, str_field};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://api.tavily.com/search";
const NAME: &str = "tavily";

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl TavilySearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let key = require_key(NAME, &self.api_key)?;
        let request = self
            .client
            .post(ENDPOINT)
            .bearer_auth(key)
            .json(&request_body(query, limit));

        let body = send_json(NAME, request).await?;
        finish(NAME, parse_response(&body), limit)
    }
}

pub fn request_body(query: &str, limit: usize) -> serde_json::Value {
    serde_json::json!({
        "query": query,
        "max_results": limit.max(1),
        "search_depth": "basic",
        "include_answer": false,
    })
}

/// Map `results[]` to hits.
pub fn parse_response(body: &serde_json::Value) -> Vec<SearchHit> {
    body.get("results")
        .and_then(|v| v.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| {
                    hit(
                        NAME,
                        str_field(r, "title"),
                        str_field(r, "url"),
                        str_field(r, "content"),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_results() {
        let body = json!({
            "query": "heat pumps",
            "results": [
                {"title": "T", "url": "https://t.example", "content": "body text", "score": 0.9}
            ]
        });
        let hits = parse_response(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "body text");
    }

    #[test]
    fn test_request_body() {
        let body = request_body("q", 0);
        assert_eq!(body["query"], "q");
        assert_eq!(body["max_results"], 1);
    }
}
