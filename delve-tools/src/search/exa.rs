//! Exa neural search API. Results carry page text, used as the snippet.

use super::{finish, hit, require_key, send_json, str_field};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://api.exa.ai/search";
const NAME: &str = "exa";

pub struct ExaSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ExaSearch {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchProvider for ExaSearch {
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
            .header("x-api-key", key)
            .json(&request_body(query, limit));

        let body = send_json(NAME, request).await?;
        finish(NAME, parse_response(&body), limit)
    }
}

pub fn request_body(query: &str, limit: usize) -> serde_json::Value {
    serde_json::json!({
        "query": query,
        "numResults": limit.max(1),
        "contents": { "text": { "maxCharacters": 1000 } },
    })
}

/// Map `results[]` to hits, preferring `text` and then `summary` as snippet.
pub fn parse_response(body: &serde_json::Value) -> Vec<SearchHit> {
    body.get("results")
        .and_then(|v| v.as_array())
        .map(|results| {
            results
                .iter()
                .map(|r| {
                    let text = match str_field(r, "text") {
                        "" => str_field(r, "summary"),
                        text => text,
                    };
                    hit(NAME, str_field(r, "title"), str_field(r, "url"), text)
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
    fn test_parse_results_with_text() {
        let body = json!({
            "results": [
                {"title": "E", "url": "https://e.example", "text": "full\n\ntext"},
                {"title": "F", "url": "https://f.example", "summary": "short"}
            ]
        });
        let hits = parse_response(&body);
        assert_eq!(hits[0].snippet, "full text");
        assert_eq!(hits[1].snippet, "short");
    }

    #[test]
    fn test_request_body_asks_for_text() {
        let body = request_body("q", 7);
        assert_eq!(body["numResults"], 7);
        assert!(body["contents"]["text"].is_object());
    }
}
