//! HTTP page fetcher.

use crate::html::extract_text;
use crate::robots::RobotsCache;
use async_trait::async_trait;
use delve_core::config::ScraperConfig;
use delve_core::error::FetchError;
use delve_core::fetch::Fetcher;
use delve_core::text::truncate_chars;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches pages over HTTP and extracts their readable text.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_content_chars: usize,
    max_retries: usize,
    retry_base_delay: Duration,
    robots: Option<RobotsCache>,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;
        let robots = config
            .respect_robots_txt
            .then(|| RobotsCache::new(client.clone(), &config.user_agent));
        Ok(Self {
            client,
            max_content_chars: config.max_content_chars,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            robots,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.5")
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !is_textual(&content_type) {
            return Err(FetchError::UnsupportedContent {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: format!("failed to read body: {e}"),
        })?;

        let text = page_text(&body, &content_type, self.max_content_chars);
        if text.is_empty() {
            return Err(FetchError::EmptyContent {
                url: url.to_string(),
            });
        }
        debug!(url, chars = text.chars().count(), "Page fetched");
        Ok(text)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        validate_url(url)?;

        if let Some(robots) = &self.robots
            && !robots.can_fetch(url).await
        {
            info!(url, "Skipping page disallowed by robots.txt");
            return Err(FetchError::Disallowed {
                url: url.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    let delay = retry_delay(self.retry_base_delay, attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Network failures and server errors may succeed on a later attempt.
pub fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Network { .. } => true,
        FetchError::Http { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Exponential backoff: `base * 2^attempt`.
fn retry_delay(base: Duration, attempt: usize) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

pub fn validate_url(url: &str) -> Result<(), FetchError> {
    let valid = ["http://", "https://"].iter().any(|scheme| {
        url.len() > scheme.len()
            && url
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });
    if valid {
        Ok(())
    } else {
        Err(FetchError::InvalidUrl {
            url: url.to_string(),
        })
    }
}

/// HTML and plain-text responses are readable; a missing type is given a try.
fn is_textual(content_type: &str) -> bool {
    content_type.is_empty()
        || content_type.starts_with("text/")
        || content_type.contains("html")
        || content_type.contains("xml")
        || content_type.contains("json")
}

/// Extract text from a response body and cut it to `max_chars`.
pub fn page_text(body: &str, content_type: &str, max_chars: usize) -> String {
    let looks_like_html = content_type.contains("html")
        || (content_type.is_empty() && body.trim_start().starts_with('<'));
    let text = if looks_like_html {
        extract_text(body)
    } else {
        body.trim().to_string()
    };
    truncate_chars(&text, max_chars).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("HTTP://example.com").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("https://").is_err());
    }

    #[test]
    fn test_page_text_html_is_extracted_and_truncated() {
        let body = "<html><body><p>Heat pumps work well.</p><p>Second paragraph.</p></body></html>";
        assert_eq!(
            page_text(body, "text/html; charset=utf-8", 1000),
            "Heat pumps work well.\nSecond paragraph."
        );
        assert_eq!(page_text(body, "text/html", 10), "Heat pumps");
    }

    #[test]
    fn test_page_text_plain() {
        assert_eq!(page_text("  <not html> plain  ", "text/plain", 100), "<not html> plain");
    }

    #[test]
    fn test_page_text_sniffs_untyped_html() {
        assert_eq!(page_text("<p>hi</p>", "", 100), "hi");
    }

    #[test]
    fn test_textual_types() {
        assert!(is_textual("text/html"));
        assert!(is_textual("application/xhtml+xml"));
        assert!(is_textual(""));
        assert!(!is_textual("application/pdf"));
        assert!(!is_textual("image/png"));
    }

    #[test]
    fn test_retryable_errors() {
        let network = FetchError::Network {
            url: "https://a.example".into(),
            message: "connection reset".into(),
        };
        let http = |status| FetchError::Http {
            url: "https://a.example".into(),
            status,
        };
        assert!(is_retryable(&network));
        assert!(is_retryable(&http(503)));
        assert!(!is_retryable(&http(404)));
        assert!(!is_retryable(&FetchError::EmptyContent {
            url: "https://a.example".into()
        }));
        assert!(!is_retryable(&FetchError::Disallowed {
            url: "https://a.example".into()
        }));
    }

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 0), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_robots_check_is_off_by_default() {
        let fetcher = HttpFetcher::new(&ScraperConfig::default()).unwrap();
        assert!(fetcher.robots.is_none());
        let strict = HttpFetcher::new(&ScraperConfig {
            respect_robots_txt: true,
            ..ScraperConfig::default()
        })
        .unwrap();
        assert!(strict.robots.is_some());
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_request() {
        let fetcher = HttpFetcher::new(&ScraperConfig::default()).unwrap();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
