//! Rate-limited page fetcher with bounded retry.
//!
//! Transient failures (network, 429, 5xx) are retried with exponential
//! backoff up to a fixed attempt budget; anything else is fatal and
//! surfaces to the caller as a run-level failure.

use std::time::Duration;

use reqwest::Client;
use scraper::Html;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::rate_limiter::RateLimiter;

/// Errors raised while fetching pages.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// Adapter-level failures that should abort the run, e.g. a selector
    /// that no longer matches anything on a page that used to work.
    #[error("adapter failure: {0}")]
    Adapter(String),
}

impl FetchError {
    /// Transient errors worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::InvalidUrl(_) | Self::Adapter(_) => false,
        }
    }
}

/// HTTP page fetcher shared by all adapters of a run.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    rate_limiter: RateLimiter,
    max_retries: u32,
}

impl Fetcher {
    /// Create a new fetcher.
    pub fn new(user_agent: &str, timeout: Duration, request_delay: Duration, max_retries: u32) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limiter: RateLimiter::new(request_delay),
            max_retries: max_retries.max(1),
        }
    }

    /// Fetch a page as text, retrying transient failures with backoff.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut backoff = Duration::from_millis(500);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        "Fetch attempt {}/{} failed for {}: {} - retrying in {:?}",
                        attempt, self.max_retries, url, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get(&self, url: &str) -> Result<String, FetchError> {
        let domain = self.rate_limiter.acquire(url).await;
        debug!("Fetching: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if let Some(ref domain) = domain {
            if status.as_u16() == 429 || status.as_u16() == 503 {
                self.rate_limiter
                    .report_rate_limit(domain, status.as_u16())
                    .await;
            } else if status.is_success() {
                self.rate_limiter.report_success(domain).await;
            }
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    /// Parse fetched markup into a document handle.
    ///
    /// Kept as an associated function so adapters can parse inside a sync
    /// scope; `Html` is not `Send` and must not be held across awaits.
    pub fn parse(html: &str) -> Html {
        Html::parse_document(html)
    }

    /// Resolve a possibly-relative URL against a base.
    pub fn resolve(base: &str, relative: &str) -> Result<String, FetchError> {
        Url::parse(base)
            .and_then(|b| b.join(relative))
            .map(|u| u.to_string())
            .map_err(|e| FetchError::InvalidUrl(format!("{base} + {relative}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(
            Fetcher::resolve("https://www.crailsheim.de/site/page1/", "../zmdetail_12345.html")
                .expect("join"),
            "https://www.crailsheim.de/site/zmdetail_12345.html"
        );
        assert_eq!(
            Fetcher::resolve("https://www.crailsheim.de", "https://other.de/x").expect("join"),
            "https://other.de/x"
        );
        assert!(Fetcher::resolve("not a base", "/x").is_err());
    }

    #[test]
    fn status_retryability() {
        let rate_limited = FetchError::Status {
            status: 429,
            url: "https://example.de".to_string(),
        };
        let server_error = FetchError::Status {
            status: 502,
            url: "https://example.de".to_string(),
        };
        let not_found = FetchError::Status {
            status: 404,
            url: "https://example.de".to_string(),
        };

        assert!(rate_limited.is_retryable());
        assert!(server_error.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!FetchError::Adapter("selector broke".to_string()).is_retryable());
    }

    #[test]
    fn parse_returns_queryable_document() {
        let html = Fetcher::parse("<html><body><h3 class='titel'>Dorffest</h3></body></html>");
        let selector = scraper::Selector::parse("h3.titel").expect("selector");
        let title = html
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>());
        assert_eq!(title.as_deref(), Some("Dorffest"));
    }
}
