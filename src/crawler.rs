use crate::circuit_breaker::{create_crawler_circuit_breaker, CrawlerBreaker};
use crate::config::Config;
use crate::errors::AppError;
use failsafe::{CircuitBreaker, Error as BreakerError};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;

/// One-shot page fetcher for government visa pages.
///
/// Crawl failures are an expected, frequent outcome (consular sites go
/// down, block bots, or move pages), so `fetch` reports them as a value
/// instead of an error; the scrape layer turns them into provenance tags.

/// Result of one page crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub success: bool,
    /// Visible page text (empty on failure).
    pub text: String,
    pub error_message: Option<String>,
}

impl CrawlOutcome {
    fn success(text: String) -> Self {
        Self {
            success: true,
            text,
            error_message: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            error_message: Some(message.into()),
        }
    }
}

/// Elements whose text is worth extracting from a visa page.
const TEXT_SELECTORS: &str = "h1, h2, h3, h4, p, li, th, td, dt, dd";

#[derive(Clone)]
pub struct CrawlerClient {
    client: reqwest::Client,
    breaker: Arc<CrawlerBreaker>,
}

impl CrawlerClient {
    /// Creates a new `CrawlerClient` with browser-like headers.
    ///
    /// Government sites frequently reject requests with a default HTTP
    /// client User-Agent.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let user_agent = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .map_err(|_| AppError::InternalError("Invalid Accept header".to_string()))?,
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5"
                .parse()
                .map_err(|_| AppError::InternalError("Invalid Accept-Language header".to_string()))?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.crawler_timeout_secs))
            .user_agent(user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create crawler client: {}", e))
            })?;

        Ok(Self {
            client,
            breaker: Arc::new(create_crawler_circuit_breaker()),
        })
    }

    /// Fetches a page and extracts its visible text. Never errors: failure
    /// is reported in the outcome so callers can tag the record instead of
    /// unwinding the whole scrape.
    pub async fn fetch(&self, url: &str) -> CrawlOutcome {
        if !self.breaker.is_call_permitted() {
            tracing::warn!("Crawler circuit open, skipping fetch: {}", url);
            return CrawlOutcome::failure(
                "crawler circuit open after repeated failures, fetch skipped",
            );
        }

        // The fetch itself is async; the breaker records the already
        // computed result through its synchronous call surface.
        let outcome = self.fetch_page(url).await;
        match self.breaker.call(|| outcome) {
            Ok(text) => {
                tracing::debug!("✓ Crawled {} ({} chars of text)", url, text.len());
                CrawlOutcome::success(text)
            }
            Err(BreakerError::Inner(e)) => {
                tracing::warn!("Crawl failed for {}: {}", url, e);
                CrawlOutcome::failure(e.to_string())
            }
            Err(BreakerError::Rejected) => {
                CrawlOutcome::failure("crawler circuit rejected the call")
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Page request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Page returned status {}",
                status
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Failed to read page body: {}", e)))?;

        Ok(html_to_text(&html))
    }
}

/// Extracts visible text from an HTML document, one line per content
/// element, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = match Selector::parse(TEXT_SELECTORS) {
        Ok(s) => s,
        Err(_) => return String::new(),
    };

    let mut out = String::new();
    for element in document.select(&selector) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            out.push_str(&text);
            out.push('\n');
        }
    }

    // Plain-text or unusually structured pages have no matching elements;
    // fall back to the raw document text.
    if out.trim().is_empty() {
        out = document
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
    }

    out
}
