//! arXiv search over the keyless Atom API.
//!
//! Entries map to hits as title, abstract-page URL and abstract text.

use super::{finish, hit, send_text};
use async_trait::async_trait;
use delve_core::error::ProviderError;
use delve_core::search::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://export.arxiv.org/api/query";
const NAME: &str = "arxiv";

pub struct ArxivSearch {
    client: reqwest::Client,
}

impl ArxivSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchProvider for ArxivSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn requires_credentials(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let request = self.client.get(build_search_url(query, limit));
        let body = send_text(NAME, request).await?;
        let hits = parse_atom(&body)
            .ok_or_else(|| ProviderError::network(NAME, "response is not an Atom feed"))?;
        finish(NAME, hits, limit)
    }
}

pub fn build_search_url(query: &str, limit: usize) -> String {
    format!(
        "{ENDPOINT}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
        urlencoding::encode(&format!("all:{}", query.trim())),
        limit.max(1)
    )
}

/// Parse an Atom feed. `None` when the body is not a feed at all.
pub fn parse_atom(xml: &str) -> Option<Vec<SearchHit>> {
    if !xml.contains("<feed") {
        return None;
    }
    Some(entries(xml).filter_map(parse_entry).collect())
}

/// Iterate over `<entry>...</entry>` blocks.
fn entries(xml: &str) -> impl Iterator<Item = &str> {
    let mut rest = xml;
    std::iter::from_fn(move || {
        let start = rest.find("<entry")?;
        let end = rest[start..].find("</entry>")? + start + "</entry>".len();
        let block = &rest[start..end];
        rest = &rest[end..];
        Some(block)
    })
}

fn parse_entry(entry: &str) -> Option<SearchHit> {
    let id = tag_text(entry, "id")?;
    let title = tag_text(entry, "title")?;
    let summary = tag_text(entry, "summary").unwrap_or_default();
    let url = abs_link(entry).unwrap_or(id);
    Some(hit(NAME, &title, &https(&url), &summary))
}

/// The `alternate` link, which points at the abstract page.
fn abs_link(entry: &str) -> Option<String> {
    let mut rest = entry;
    while let Some(pos) = rest.find("<link") {
        let tag_end = rest[pos..].find('>')? + pos + 1;
        let tag = &rest[pos..tag_end];
        if tag.contains("rel=\"alternate\"")
            && let Some(href) = attribute(tag, "href")
        {
            return Some(href);
        }
        rest = &rest[tag_end..];
    }
    None
}

fn https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

/// Text of the first `<tag>...</tag>`, with attributes on the open tag allowed.
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut from = 0;
    loop {
        let start = xml[from..].find(&open)? + from;
        let after = &xml[start + open.len()..];
        // skip longer tag names sharing the prefix
        if after.starts_with('>') || after.starts_with(' ') {
            let content_start = xml[start..].find('>')? + start + 1;
            let content_end = xml[content_start..].find(&close)? + content_start;
            return Some(decode_entities(xml[content_start..content_end].trim()));
        }
        from = start + open.len();
    }
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
