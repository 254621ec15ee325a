//! Use-case facade
//!
//! The narrow surface external collaborators (dashboard, scheduler, file
//! import) talk to: start/cancel/poll runs, look up matches for a BOM line,
//! and read or write selector strategies.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::application::progress::ProgressTracker;
use crate::application::runner::{BatchRunner, RunHandle};
use crate::domain::errors::{RunError, StorageError};
use crate::domain::part::{MatchResult, PartFilter, QueryPart};
use crate::domain::repositories::{PartRepository, StrategyRepository};
use crate::domain::run::RunState;
use crate::domain::services::DatasheetProvider;
use crate::domain::strategy::SelectorStrategy;
use crate::infrastructure::config::{AppConfig, MatchingConfig};
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::http_client::HttpClientConfig;
use crate::infrastructure::part_repository::SqlitePartRepository;
use crate::infrastructure::run_repository::SqliteRunRepository;
use crate::infrastructure::scraping::{ScraperRegistry, StrategyDetector};
use crate::infrastructure::strategy_repository::SqliteStrategyRepository;
use crate::matching::{MatchWeights, MatchingEngine};

/// Caller-facing catalog restriction for lookups.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub suppliers: Option<Vec<String>>,
    pub in_stock_only: bool,
    /// Stale records are excluded from matching unless explicitly included.
    pub include_stale: bool,
    pub limit: Option<u32>,
}

pub struct SourcingService {
    runner: BatchRunner,
    tracker: Arc<ProgressTracker>,
    parts: Arc<dyn PartRepository>,
    strategies: Arc<dyn StrategyRepository>,
    engine: MatchingEngine,
    stale_after: chrono::Duration,
    datasheets: Option<Arc<dyn DatasheetProvider>>,
    active_runs: Mutex<HashMap<String, RunHandle>>,
}

impl SourcingService {
    pub fn new(
        runner: BatchRunner,
        tracker: Arc<ProgressTracker>,
        parts: Arc<dyn PartRepository>,
        strategies: Arc<dyn StrategyRepository>,
        matching: &MatchingConfig,
    ) -> Self {
        let engine = MatchingEngine::new(
            MatchWeights {
                token: matching.token_weight,
                tfidf: matching.tfidf_weight,
            },
            matching.min_score,
        );
        Self {
            runner,
            tracker,
            parts,
            strategies,
            engine,
            stale_after: chrono::Duration::days(i64::from(matching.stale_after_days)),
            datasheets: None,
            active_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_datasheet_provider(mut self, provider: Arc<dyn DatasheetProvider>) -> Self {
        self.datasheets = Some(provider);
        self
    }

    /// Composition root: open and migrate the database, build one scraper
    /// per configured supplier, and wire runner, tracker, and matcher from
    /// the validated configuration.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let db = DatabaseConnection::new(&config.database.url).await?;
        db.migrate().await?;

        let parts = Arc::new(SqlitePartRepository::new(db.pool().clone()));
        let strategies = Arc::new(SqliteStrategyRepository::new(db.pool().clone()));
        let runs = Arc::new(SqliteRunRepository::new(db.pool().clone()));
        let tracker = Arc::new(ProgressTracker::new(runs));

        let http_defaults = HttpClientConfig {
            user_agent: config.scraping.user_agent.clone(),
            timeout_seconds: config.scraping.timeout_secs,
            max_requests_per_second: config.scraping.max_requests_per_second,
            ..HttpClientConfig::default()
        };
        let registry = Arc::new(ScraperRegistry::build(&config.suppliers, &http_defaults)?);

        let limits = crate::domain::services::ScrapeLimits {
            timeout: std::time::Duration::from_secs(config.scraping.timeout_secs),
            max_results: config.scraping.max_results,
        };
        let runner = BatchRunner::new(
            registry,
            parts.clone(),
            strategies.clone(),
            tracker.clone(),
            Arc::new(StrategyDetector::new(config.detection.clone())),
            config.runner.clone(),
            limits,
        );

        Ok(Self::new(
            runner,
            tracker,
            parts,
            strategies,
            &config.matching,
        ))
    }

    /// Kick off a background scraping run; returns its id immediately.
    pub async fn start_run(
        &self,
        supplier_ids: Vec<String>,
        work_list: Vec<QueryPart>,
    ) -> Result<String, RunError> {
        let handle = self.runner.start_run(supplier_ids, work_list).await?;
        let run_id = handle.run_id.clone();
        let mut runs = self.active_runs.lock().await;
        runs.retain(|_, h| !h.is_finished());
        runs.insert(run_id.clone(), handle);
        Ok(run_id)
    }

    /// Request cooperative cancellation. `Ok(false)` means the run exists
    /// but is not cancellable from this process (e.g. it belongs to a
    /// previous one).
    pub async fn cancel_run(&self, run_id: &str) -> Result<bool, RunError> {
        {
            let runs = self.active_runs.lock().await;
            if let Some(handle) = runs.get(run_id) {
                handle.cancel();
                return Ok(true);
            }
        }
        match self.tracker.snapshot(run_id).await? {
            Some(_) => Ok(false),
            None => Err(RunError::UnknownRun {
                run_id: run_id.to_string(),
            }),
        }
    }

    pub async fn poll_progress(&self, run_id: &str) -> Result<Option<RunState>, StorageError> {
        self.tracker.snapshot(run_id).await
    }

    /// Runs a crash left non-terminal; the caller reconciles them.
    pub async fn unfinished_runs(&self) -> Result<Vec<RunState>, StorageError> {
        self.tracker.unfinished_runs().await
    }

    /// Rank cached catalog records against one BOM line. Datasheet
    /// enrichment is best-effort and never changes scores or ordering.
    pub async fn lookup(
        &self,
        query: &QueryPart,
        filter: &CatalogFilter,
        top_k: usize,
    ) -> Result<Vec<MatchResult>, StorageError> {
        let part_filter = PartFilter {
            suppliers: filter.suppliers.clone(),
            in_stock_only: filter.in_stock_only,
            observed_after: if filter.include_stale {
                None
            } else {
                Some(Utc::now() - self.stale_after)
            },
            limit: filter.limit,
        };
        let catalog = self.parts.query(&part_filter).await?;
        let mut results = self.engine.rank(query, &catalog, top_k);

        if let Some(provider) = &self.datasheets {
            for result in &mut results {
                if result.record.datasheet_url.is_some() {
                    continue;
                }
                let mpn = result.record.normalized_mpn();
                match provider.datasheet_url(&mpn).await {
                    Ok(Some(url)) => result.record.datasheet_url = Some(url),
                    Ok(None) => {}
                    Err(e) => warn!(
                        part_number = %result.record.part_number,
                        "datasheet lookup failed: {e}"
                    ),
                }
            }
        }
        Ok(results)
    }

    pub async fn get_active_strategy(
        &self,
        supplier_id: &str,
    ) -> Result<Option<SelectorStrategy>, StorageError> {
        self.strategies.get_active(supplier_id).await
    }

    pub async fn set_strategy(
        &self,
        strategy: SelectorStrategy,
    ) -> Result<SelectorStrategy, StorageError> {
        self.strategies.set_strategy(strategy).await
    }

    pub async fn strategy_history(
        &self,
        supplier_id: &str,
    ) -> Result<Vec<SelectorStrategy>, StorageError> {
        self.strategies.history(supplier_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::part::PartRecord;
    use crate::domain::run::RunStatus;
    use crate::domain::services::ScrapeLimits;
    use crate::infrastructure::config::RunnerSettings;
    use crate::infrastructure::scraping::{ScraperRegistry, StrategyDetector};
    use crate::test_utils::{sqlite_stores, SqliteStores, StaticScraper};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedDatasheets;

    #[async_trait]
    impl DatasheetProvider for FixedDatasheets {
        async fn datasheet_url(&self, mpn: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("https://sheets.example/{mpn}.pdf")))
        }
    }

    struct BrokenDatasheets;

    #[async_trait]
    impl DatasheetProvider for BrokenDatasheets {
        async fn datasheet_url(&self, _mpn: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("datasheet index unreachable")
        }
    }

    fn service(stores: &SqliteStores, registry: ScraperRegistry) -> SourcingService {
        let tracker = Arc::new(ProgressTracker::new(stores.runs.clone()));
        let runner = BatchRunner::new(
            Arc::new(registry),
            stores.parts.clone(),
            stores.strategies.clone(),
            tracker.clone(),
            Arc::new(StrategyDetector::default()),
            RunnerSettings::default(),
            ScrapeLimits::default(),
        );
        SourcingService::new(
            runner,
            tracker,
            stores.parts.clone(),
            stores.strategies.clone(),
            &MatchingConfig::default(),
        )
    }

    fn catalog_record(part_number: &str, observed_days_ago: i64) -> PartRecord {
        PartRecord {
            supplier_id: "acme".into(),
            part_number: part_number.into(),
            manufacturer_part_number: None,
            description: Some("precision resistor".into()),
            quantity_available: Some(10),
            unit_price: Some(0.10),
            currency: Some("USD".into()),
            purchase_url: None,
            datasheet_url: None,
            observed_at: Utc::now() - chrono::Duration::days(observed_days_ago),
            source_strategy_version: 1,
        }
    }

    #[tokio::test]
    async fn run_through_facade_completes_and_polls() {
        let (_dir, stores) = sqlite_stores().await;
        let mut registry = ScraperRegistry::new();
        registry.register(Arc::new(StaticScraper::new("acme")));
        let service = service(&stores, registry);

        let run_id = service
            .start_run(
                vec!["acme".into()],
                vec![QueryPart::from_part_number("R-100")],
            )
            .await
            .unwrap();

        let mut status = RunStatus::Pending;
        for _ in 0..100 {
            if let Some(snap) = service.poll_progress(&run_id).await.unwrap() {
                status = snap.status;
                if status.is_terminal() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_is_acknowledged_for_known_runs_only() {
        let (_dir, stores) = sqlite_stores().await;
        let mut registry = ScraperRegistry::new();
        registry.register(Arc::new(StaticScraper::new("acme")));
        let service = service(&stores, registry);

        let run_id = service
            .start_run(
                vec!["acme".into()],
                vec![QueryPart::from_part_number("R-100")],
            )
            .await
            .unwrap();
        assert!(service.cancel_run(&run_id).await.unwrap());

        let err = service.cancel_run("no-such-run").await.unwrap_err();
        assert!(matches!(err, RunError::UnknownRun { .. }));
    }

    #[tokio::test]
    async fn lookup_excludes_stale_records_by_default() {
        let (_dir, stores) = sqlite_stores().await;
        stores
            .parts
            .upsert_batch(&[catalog_record("R-100", 0), catalog_record("R-100X", 30)])
            .await
            .unwrap();
        let service = service(&stores, ScraperRegistry::new());

        let fresh_only = service
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter::default(),
                10,
            )
            .await
            .unwrap();
        assert_eq!(fresh_only.len(), 1);
        assert_eq!(fresh_only[0].record.part_number, "R-100");

        let with_stale = service
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter {
                    include_stale: true,
                    ..CatalogFilter::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(with_stale.len(), 2);
    }

    #[tokio::test]
    async fn datasheet_enrichment_fills_links() {
        let (_dir, stores) = sqlite_stores().await;
        stores
            .parts
            .upsert_batch(&[catalog_record("R-100", 0)])
            .await
            .unwrap();
        let service = service(&stores, ScraperRegistry::new())
            .with_datasheet_provider(Arc::new(FixedDatasheets));

        let results = service
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter::default(),
                10,
            )
            .await
            .unwrap();
        assert_eq!(
            results[0].record.datasheet_url.as_deref(),
            Some("https://sheets.example/R100.pdf")
        );
    }

    #[tokio::test]
    async fn datasheet_failures_leave_match_results_intact() {
        let (_dir, stores) = sqlite_stores().await;
        stores
            .parts
            .upsert_batch(&[catalog_record("R-100", 0), catalog_record("R-101", 0)])
            .await
            .unwrap();

        let plain = service(&stores, ScraperRegistry::new());
        let baseline = plain
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter::default(),
                10,
            )
            .await
            .unwrap();

        let broken = service(&stores, ScraperRegistry::new())
            .with_datasheet_provider(Arc::new(BrokenDatasheets));
        let enriched = broken
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter::default(),
                10,
            )
            .await
            .unwrap();

        assert_eq!(baseline, enriched);
    }

    #[tokio::test]
    async fn bootstrap_from_config_opens_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite:{}", dir.path().join("app.db").display());

        let service = SourcingService::from_config(&config).await.unwrap();
        assert!(service.unfinished_runs().await.unwrap().is_empty());
        assert!(service
            .lookup(
                &QueryPart::from_part_number("R-100"),
                &CatalogFilter::default(),
                5,
            )
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn strategy_round_trip_through_facade() {
        let (_dir, stores) = sqlite_stores().await;
        let service = service(&stores, ScraperRegistry::new());

        let manual = SelectorStrategy::manual(
            "acme",
            "https://acme.example/search?q={query}",
            "div.product",
            crate::domain::strategy::FieldSelectors::default(),
        );
        let stored = service.set_strategy(manual).await.unwrap();
        assert_eq!(stored.version, 1);

        let active = service.get_active_strategy("acme").await.unwrap().unwrap();
        assert!(active.is_manual_override);
        assert_eq!(service.strategy_history("acme").await.unwrap().len(), 1);
    }
}
