//! Supplier scrapers
//!
//! Each supplier is one variant of the same capability: produce part
//! records for a query using a selector strategy. Quirks (extra headers,
//! pagination, request rate) are captured in a `SupplierSpec` and
//! encapsulated behind the `SupplierScraper` trait so shared orchestration
//! never branches on supplier identity.

pub mod detector;
pub mod extractor;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::errors::ScrapeError;
use crate::domain::part::PartRecord;
use crate::domain::services::{ScrapeLimits, SupplierScraper};
use crate::domain::strategy::SelectorStrategy;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};

pub use detector::{DetectionConfig, StrategyDetector};
pub use extractor::extract_records;

/// Pagination quirk: follow a next-page link up to a page cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// Selector for the next-page link (or an element inside it).
    pub next_selector: String,
    pub max_pages: u32,
}

/// Declarative description of one supplier's scraping behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierSpec {
    pub supplier_id: String,
    /// Search URL with a `{query}` placeholder; the detection hint and the
    /// sample-fetch target. A stored strategy's own template wins at scrape
    /// time.
    pub search_url_template: String,
    /// Base for resolving relative purchase links.
    pub base_url: String,
    pub extra_headers: Vec<(String, String)>,
    pub pagination: Option<PaginationSpec>,
    pub max_requests_per_second: Option<u32>,
}

impl SupplierSpec {
    fn http_config(&self, defaults: &HttpClientConfig) -> HttpClientConfig {
        HttpClientConfig {
            extra_headers: self.extra_headers.clone(),
            max_requests_per_second: self
                .max_requests_per_second
                .unwrap_or(defaults.max_requests_per_second),
            ..defaults.clone()
        }
    }

    fn sample_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url_template.replace("{query}", &encoded)
    }
}

/// Scrapers keyed by supplier id.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<String, Arc<dyn SupplierScraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the closed set of scraper variants from supplier specs.
    pub fn build(specs: &[SupplierSpec], defaults: &HttpClientConfig) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for spec in specs {
            let http = HttpClient::new(spec.http_config(defaults))?;
            let scraper: Arc<dyn SupplierScraper> = match &spec.pagination {
                Some(pagination) => Arc::new(PaginatedSelectorScraper {
                    inner: SelectorScraper {
                        spec: spec.clone(),
                        http,
                    },
                    pagination: pagination.clone(),
                }),
                None => Arc::new(SelectorScraper {
                    spec: spec.clone(),
                    http,
                }),
            };
            registry.register(scraper);
        }
        Ok(registry)
    }

    pub fn register(&mut self, scraper: Arc<dyn SupplierScraper>) {
        self.scrapers
            .insert(scraper.supplier_id().to_string(), scraper);
    }

    pub fn get(&self, supplier_id: &str) -> Option<Arc<dyn SupplierScraper>> {
        self.scrapers.get(supplier_id).cloned()
    }

    pub fn supplier_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scrapers.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

/// One fetch per query, parsed with the strategy's selectors.
pub struct SelectorScraper {
    spec: SupplierSpec,
    http: HttpClient,
}

impl SelectorScraper {
    pub fn new(spec: SupplierSpec, http: HttpClient) -> Self {
        Self { spec, http }
    }

    async fn fetch_page(&self, url: &str, limits: ScrapeLimits) -> Result<String, ScrapeError> {
        match timeout(limits.timeout, self.http.get_text(url)).await {
            Err(_) => Err(ScrapeError::TransientFetch {
                url: url.to_string(),
                reason: format!("timed out after {:?}", limits.timeout),
            }),
            Ok(Err(e)) => Err(ScrapeError::TransientFetch {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok(html)) => Ok(html),
        }
    }
}

#[async_trait]
impl SupplierScraper for SelectorScraper {
    fn supplier_id(&self) -> &str {
        &self.spec.supplier_id
    }

    fn search_url_template(&self) -> &str {
        &self.spec.search_url_template
    }

    async fn scrape(
        &self,
        query: &str,
        strategy: &SelectorStrategy,
        limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError> {
        let url = strategy.search_url(query);
        let html = self.fetch_page(&url, limits).await?;
        let outcome = extract_records(
            &html,
            strategy,
            &self.spec.base_url,
            limits.max_results,
            Utc::now(),
        )?;
        debug!(
            supplier_id = %self.spec.supplier_id,
            query,
            records = outcome.records.len(),
            "scraped"
        );
        Ok(outcome.records)
    }

    async fn fetch_sample(&self, query: &str) -> Result<String, ScrapeError> {
        let url = self.spec.sample_url(query);
        self.fetch_page(&url, ScrapeLimits::default()).await
    }
}

/// Follows the supplier's next-page link until the page cap or the result
/// cap is reached. Everything else behaves like `SelectorScraper`.
pub struct PaginatedSelectorScraper {
    inner: SelectorScraper,
    pagination: PaginationSpec,
}

impl PaginatedSelectorScraper {
    pub fn new(spec: SupplierSpec, http: HttpClient, pagination: PaginationSpec) -> Self {
        Self {
            inner: SelectorScraper::new(spec, http),
            pagination,
        }
    }
}

#[async_trait]
impl SupplierScraper for PaginatedSelectorScraper {
    fn supplier_id(&self) -> &str {
        self.inner.supplier_id()
    }

    fn search_url_template(&self) -> &str {
        self.inner.search_url_template()
    }

    async fn scrape(
        &self,
        query: &str,
        strategy: &SelectorStrategy,
        limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError> {
        let mut url = strategy.search_url(query);
        let mut records = Vec::new();

        for page in 0..self.pagination.max_pages.max(1) {
            let html = self.inner.fetch_page(&url, limits).await;
            let html = match (page, html) {
                (_, Ok(html)) => html,
                // First page failing fails the call; a later page failing
                // just ends pagination with what we have.
                (0, Err(e)) => return Err(e),
                (_, Err(e)) => {
                    warn!(supplier_id = %self.supplier_id(), page, "pagination stopped: {e}");
                    break;
                }
            };

            let remaining = limits.max_results.saturating_sub(records.len());
            let outcome = extract_records(
                &html,
                strategy,
                &self.inner.spec.base_url,
                remaining,
                Utc::now(),
            )?;
            records.extend(outcome.records);
            if records.len() >= limits.max_results {
                break;
            }

            match next_page_url(&html, &self.pagination.next_selector, &self.inner.spec.base_url) {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }

        debug!(
            supplier_id = %self.supplier_id(),
            query,
            records = records.len(),
            "scraped with pagination"
        );
        Ok(records)
    }

    async fn fetch_sample(&self, query: &str) -> Result<String, ScrapeError> {
        self.inner.fetch_sample(query).await
    }
}

/// Resolve the next-page link. The selector may point at the anchor itself
/// or at a marker element inside one.
fn next_page_url(html: &str, next_selector: &str, base_url: &str) -> Option<String> {
    let selector = Selector::parse(next_selector).ok()?;
    let document = Html::parse_document(html);
    let el = document.select(&selector).next()?;

    let href = el.value().attr("href").map(str::to_string).or_else(|| {
        let mut current = el.parent();
        while let Some(node) = current {
            if let Some(parent_el) = ElementRef::wrap(node) {
                if parent_el.value().name() == "a" {
                    return parent_el.value().attr("href").map(str::to_string);
                }
            }
            current = node.parent();
        }
        None
    })?;

    if href.starts_with("http://") || href.starts_with("https://") {
        Some(href)
    } else {
        url::Url::parse(base_url)
            .and_then(|base| base.join(&href))
            .map(|u| u.to_string())
            .ok()
    }
}
