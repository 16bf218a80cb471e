//! DuckDuckGo instant answers. Keyless; the chain's last-resort fallback.

use super::{finish, hit, send_json, str_field};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://api.duckduckgo.com/";
const NAME: &str = "duckduckgo";

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn requires_credentials(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let request = self.client.get(ENDPOINT).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let body = send_json(NAME, request).await?;
        finish(NAME, parse_response(&body), limit)
    }
}

/// Collect the abstract, then `Results[]`, then `RelatedTopics[]` (including
/// topics nested in category groups).
pub fn parse_response(body: &serde_json::Value) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    let abstract_url = str_field(body, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let title = match str_field(body, "Heading") {
            "" => str_field(body, "AbstractSource"),
            heading => heading,
        };
        hits.push(hit(NAME, title, abstract_url, abstract_text));
    }

    if let Some(results) = body.get("Results").and_then(|v| v.as_array()) {
        hits.extend(results.iter().filter_map(topic_hit));
    }

    if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
        for topic in topics {
            match topic.get("Topics").and_then(|v| v.as_array()) {
                Some(group) => hits.extend(group.iter().filter_map(topic_hit)),
                None => hits.extend(topic_hit(topic)),
            }
        }
    }

    hits
}

fn topic_hit(topic: &serde_json::Value) -> Option<SearchHit> {
    let text = str_field(topic, "Text");
    let url = str_field(topic, "FirstURL");
    if text.is_empty() || url.is_empty() {
        return None;
    }
    let title = text.split(" - ").next().unwrap_or(text);
    Some(hit(NAME, title, url, text))
}
