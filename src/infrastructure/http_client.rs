//! HTTP client for supplier scraping with rate limiting
//!
//! One client per supplier scraper so politeness (request rate, headers,
//! timeout) is enforced per supplier, not globally.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Client;

/// Per-supplier HTTP behavior.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    pub follow_redirects: bool,
    /// Supplier-specific headers (anti-bot requirements and the like).
    pub extra_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "partscout/0.2 (+component sourcing)".to_string(),
            timeout_seconds: 30,
            max_requests_per_second: 4,
            follow_redirects: true,
            extra_headers: Vec::new(),
        }
    }
}

/// Rate-limited HTTP client.
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        for (name, value) in &config.extra_headers {
            let name: HeaderName = name
                .parse()
                .with_context(|| format!("Invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid header value for {name}"))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// Fetch a URL and return the body text. Non-2xx statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", response.status(), url);
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {url}"))?;
        tracing::debug!(url, chars = text.len(), "fetched");
        Ok(text)
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}
