//! Service interfaces implemented by the infrastructure layer.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::ScrapeError;
use crate::domain::part::PartRecord;
use crate::domain::strategy::SelectorStrategy;

/// Per-call bounds on a scrape: a hard timeout around the whole call and a
/// cap on extracted records.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeLimits {
    pub timeout: Duration,
    pub max_results: usize,
}

impl Default for ScrapeLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_results: 20,
        }
    }
}

/// One supplier's scraping capability. Supplier-specific quirks (pagination,
/// headers, politeness) live behind this contract; the batch runner never
/// branches on supplier identity.
#[async_trait]
pub trait SupplierScraper: Send + Sync {
    fn supplier_id(&self) -> &str;

    /// Search URL template used as the hint when a strategy has to be
    /// auto-detected for this supplier.
    fn search_url_template(&self) -> &str;

    /// Fetch and parse search results for one query. Individual result
    /// blocks that yield no usable part number are skipped, not fatal; a
    /// failed fetch is a scraper-level error distinct from a zero-result
    /// success.
    async fn scrape(
        &self,
        query: &str,
        strategy: &SelectorStrategy,
        limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError>;

    /// Fetch a raw sample search-results page for strategy auto-detection.
    async fn fetch_sample(&self, query: &str) -> Result<String, ScrapeError>;
}

/// Optional post-match datasheet lookup keyed by normalized manufacturer
/// part number. Lookup failures never affect match results.
#[async_trait]
pub trait DatasheetProvider: Send + Sync {
    async fn datasheet_url(
        &self,
        manufacturer_part_number: &str,
    ) -> anyhow::Result<Option<String>>;
}
