//! Test utilities
//!
//! Canned scrapers and SQLite-backed store fixtures shared by the runner,
//! progress, and use-case tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::ScrapeError;
use crate::domain::part::PartRecord;
use crate::domain::services::{ScrapeLimits, SupplierScraper};
use crate::domain::strategy::SelectorStrategy;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::part_repository::SqlitePartRepository;
use crate::infrastructure::run_repository::SqliteRunRepository;
use crate::infrastructure::strategy_repository::SqliteStrategyRepository;

pub const TEST_URL_TEMPLATE: &str = "https://test.example/search?q={query}";

/// A sample page the auto-detector maps cleanly.
pub const DETECTABLE_SAMPLE: &str = r#"
    <html><body><div class="results">
    <div class="product-card"><span class="sku">AA-1001</span><h3 class="title">Ceramic capacitor 100nF 50V</h3><span class="price">$0.10</span><a class="buy" href="/p/1">Buy</a></div>
    <div class="product-card"><span class="sku">AA-1002</span><h3 class="title">Ceramic capacitor 220nF 50V</h3><span class="price">$0.11</span><a class="buy" href="/p/2">Buy</a></div>
    <div class="product-card"><span class="sku">AA-1003</span><h3 class="title">Ceramic capacitor 470nF 50V</h3><span class="price">$0.12</span><a class="buy" href="/p/3">Buy</a></div>
    <div class="product-card"><span class="sku">AA-1004</span><h3 class="title">Ceramic capacitor 1uF 25V</h3><span class="price">$0.13</span><a class="buy" href="/p/4">Buy</a></div>
    <div class="product-card"><span class="sku">AA-1005</span><h3 class="title">Ceramic capacitor 2.2uF 25V</h3><span class="price">$0.14</span><a class="buy" href="/p/5">Buy</a></div>
    </div></body></html>
"#;

/// A page with too few repeated blocks for detection to accept.
pub const UNDETECTABLE_SAMPLE: &str = r#"
    <html><body>
    <div class="product-card"><span class="sku">AA-1001</span></div>
    </body></html>
"#;

pub struct SqliteStores {
    pub parts: Arc<SqlitePartRepository>,
    pub strategies: Arc<SqliteStrategyRepository>,
    pub runs: Arc<SqliteRunRepository>,
}

/// Fresh migrated SQLite stores on a temp directory.
pub async fn sqlite_stores() -> (tempfile::TempDir, SqliteStores) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite:{}", dir.path().join("fixture.db").display());
    let db = DatabaseConnection::new(&url).await.expect("db");
    db.migrate().await.expect("migration");
    let stores = SqliteStores {
        parts: Arc::new(SqlitePartRepository::new(db.pool().clone())),
        strategies: Arc::new(SqliteStrategyRepository::new(db.pool().clone())),
        runs: Arc::new(SqliteRunRepository::new(db.pool().clone())),
    };
    (dir, stores)
}

/// Yields a fixed number of records per query without touching the network.
pub struct StaticScraper {
    supplier_id: String,
    records_per_query: usize,
}

impl StaticScraper {
    pub fn new(supplier_id: &str) -> Self {
        Self::with_records_per_query(supplier_id, 1)
    }

    pub fn with_records_per_query(supplier_id: &str, records_per_query: usize) -> Self {
        Self {
            supplier_id: supplier_id.to_string(),
            records_per_query,
        }
    }
}

#[async_trait]
impl SupplierScraper for StaticScraper {
    fn supplier_id(&self) -> &str {
        &self.supplier_id
    }

    fn search_url_template(&self) -> &str {
        TEST_URL_TEMPLATE
    }

    async fn scrape(
        &self,
        query: &str,
        strategy: &SelectorStrategy,
        _limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError> {
        let records = (0..self.records_per_query)
            .map(|i| PartRecord {
                supplier_id: self.supplier_id.clone(),
                part_number: if self.records_per_query == 1 {
                    query.to_string()
                } else {
                    format!("{query}-{i}")
                },
                manufacturer_part_number: None,
                description: Some(format!("canned listing for {query}")),
                quantity_available: Some(100),
                unit_price: Some(0.10),
                currency: Some("USD".into()),
                purchase_url: Some(format!("https://test.example/p/{query}")),
                datasheet_url: None,
                observed_at: Utc::now(),
                source_strategy_version: strategy.version,
            })
            .collect();
        Ok(records)
    }

    async fn fetch_sample(&self, _query: &str) -> Result<String, ScrapeError> {
        Ok(DETECTABLE_SAMPLE.to_string())
    }
}

/// Resolves a strategy fine but fails every scrape with a transient error.
pub struct FailingScraper {
    supplier_id: String,
}

impl FailingScraper {
    pub fn new(supplier_id: &str) -> Self {
        Self {
            supplier_id: supplier_id.to_string(),
        }
    }
}

#[async_trait]
impl SupplierScraper for FailingScraper {
    fn supplier_id(&self) -> &str {
        &self.supplier_id
    }

    fn search_url_template(&self) -> &str {
        TEST_URL_TEMPLATE
    }

    async fn scrape(
        &self,
        query: &str,
        _strategy: &SelectorStrategy,
        _limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError> {
        Err(ScrapeError::TransientFetch {
            url: format!("https://test.example/search?q={query}"),
            reason: "connection refused".into(),
        })
    }

    async fn fetch_sample(&self, _query: &str) -> Result<String, ScrapeError> {
        Ok(DETECTABLE_SAMPLE.to_string())
    }
}

/// No stored strategy can be established: the sample page has too few
/// repeated blocks for detection.
pub struct UndetectableScraper {
    supplier_id: String,
}

impl UndetectableScraper {
    pub fn new(supplier_id: &str) -> Self {
        Self {
            supplier_id: supplier_id.to_string(),
        }
    }
}

#[async_trait]
impl SupplierScraper for UndetectableScraper {
    fn supplier_id(&self) -> &str {
        &self.supplier_id
    }

    fn search_url_template(&self) -> &str {
        TEST_URL_TEMPLATE
    }

    async fn scrape(
        &self,
        _query: &str,
        _strategy: &SelectorStrategy,
        _limits: ScrapeLimits,
    ) -> Result<Vec<PartRecord>, ScrapeError> {
        Ok(Vec::new())
    }

    async fn fetch_sample(&self, _query: &str) -> Result<String, ScrapeError> {
        Ok(UNDETECTABLE_SAMPLE.to_string())
    }
}
