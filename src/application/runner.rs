//! Batch runner
//!
//! Drives scraping for a work list across suppliers in bounded batches on a
//! dedicated background task. One supplier's failures never abort another's
//! work; cancellation is cooperative and checked between batches, so
//! in-flight scrape calls always complete.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::progress::ProgressTracker;
use crate::domain::errors::{DetectionError, RunError, ScrapeError, StorageError};
use crate::domain::part::{PartRecord, QueryPart};
use crate::domain::repositories::{PartRepository, StrategyRepository};
use crate::domain::run::{ProgressDelta, RunStatus};
use crate::domain::services::{ScrapeLimits, SupplierScraper};
use crate::domain::strategy::SelectorStrategy;
use crate::infrastructure::config::RunnerSettings;
use crate::infrastructure::scraping::{ScraperRegistry, StrategyDetector};

/// Handle returned to the caller when a run starts. The run itself executes
/// on its own task; progress is observed by polling, never by blocking.
pub struct RunHandle {
    pub run_id: String,
    cancellation: CancellationToken,
    join: JoinHandle<()>,
}

impl RunHandle {
    /// Request cooperative cancellation. The current batch finishes; no new
    /// batch starts.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the background task to exit. Test and shutdown helper; the
    /// normal observation path is polling the progress tracker.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

#[derive(Clone)]
pub struct BatchRunner {
    registry: Arc<ScraperRegistry>,
    parts: Arc<dyn PartRepository>,
    strategies: Arc<dyn StrategyRepository>,
    tracker: Arc<ProgressTracker>,
    detector: Arc<StrategyDetector>,
    settings: RunnerSettings,
    limits: ScrapeLimits,
}

struct ActiveSupplier {
    supplier_id: String,
    scraper: Arc<dyn SupplierScraper>,
    strategy: Arc<SelectorStrategy>,
}

#[derive(Default)]
struct BatchAccum {
    scraped: u64,
    errors: u64,
    records: Vec<PartRecord>,
}

async fn run_scrape_task(
    task: (String, Arc<dyn SupplierScraper>, Arc<SelectorStrategy>, QueryPart),
    limits: ScrapeLimits,
) -> (String, Result<Vec<PartRecord>, ScrapeError>) {
    let (supplier_id, scraper, strategy, query) = task;
    let outcome = match query.search_term() {
        None => Err(ScrapeError::Parse {
            supplier_id: supplier_id.clone(),
            reason: "query part has no searchable text".into(),
        }),
        Some(term) => scraper.scrape(term, &strategy, limits).await,
    };
    (supplier_id, outcome)
}

impl BatchRunner {
    pub fn new(
        registry: Arc<ScraperRegistry>,
        parts: Arc<dyn PartRepository>,
        strategies: Arc<dyn StrategyRepository>,
        tracker: Arc<ProgressTracker>,
        detector: Arc<StrategyDetector>,
        settings: RunnerSettings,
        limits: ScrapeLimits,
    ) -> Self {
        Self {
            registry,
            parts,
            strategies,
            tracker,
            detector,
            settings,
            limits,
        }
    }

    /// Start a run and return immediately. The caller polls the progress
    /// tracker with the returned run id.
    pub async fn start_run(
        &self,
        supplier_ids: Vec<String>,
        work_list: Vec<QueryPart>,
    ) -> Result<RunHandle, RunError> {
        for supplier_id in &supplier_ids {
            if self.registry.get(supplier_id).is_none() {
                return Err(RunError::UnknownSupplier {
                    supplier_id: supplier_id.clone(),
                });
            }
        }

        let run_id = Uuid::new_v4().to_string();
        self.tracker
            .create(&run_id, &supplier_ids, work_list.len() as u64)
            .await?;

        let cancellation = CancellationToken::new();
        let runner = self.clone();
        let task_run_id = run_id.clone();
        let task_token = cancellation.clone();
        let join = tokio::spawn(async move {
            runner
                .run_loop(task_run_id, supplier_ids, work_list, task_token)
                .await;
        });

        Ok(RunHandle {
            run_id,
            cancellation,
            join,
        })
    }

    async fn run_loop(
        self,
        run_id: String,
        supplier_ids: Vec<String>,
        work_list: Vec<QueryPart>,
        token: CancellationToken,
    ) {
        if let Err(e) = self.tracker.mark_running(&run_id).await {
            warn!(%run_id, "could not persist running status: {e}");
        }

        let probe = work_list
            .iter()
            .find_map(|q| q.search_term())
            .unwrap_or("resistor")
            .to_string();

        let mut active: Vec<ActiveSupplier> = Vec::new();
        for supplier_id in &supplier_ids {
            let Some(scraper) = self.registry.get(supplier_id) else {
                continue;
            };
            match self.resolve_strategy(scraper.as_ref(), supplier_id, &probe).await {
                Ok(strategy) => active.push(ActiveSupplier {
                    supplier_id: supplier_id.clone(),
                    scraper,
                    strategy: Arc::new(strategy),
                }),
                Err(e) => {
                    warn!(%supplier_id, "supplier excluded from run: {e}");
                    let _ = self
                        .tracker
                        .advance(
                            &run_id,
                            supplier_id,
                            ProgressDelta {
                                errors: 1,
                                ..ProgressDelta::default()
                            },
                        )
                        .await;
                }
            }
        }

        if active.is_empty() {
            error!(%run_id, "no supplier in the work list has a usable strategy");
            let _ = self.tracker.finish(&run_id, RunStatus::Failed).await;
            return;
        }

        for batch in work_list.chunks(self.settings.batch_size) {
            if token.is_cancelled() {
                info!(%run_id, "cancellation requested; stopping before next batch");
                let _ = self.tracker.finish(&run_id, RunStatus::Cancelled).await;
                return;
            }
            if active.is_empty() {
                break;
            }

            for supplier in &active {
                let _ = self
                    .tracker
                    .advance(
                        &run_id,
                        &supplier.supplier_id,
                        ProgressDelta::requested(batch.len() as u64),
                    )
                    .await;
            }

            let mut tasks = Vec::with_capacity(active.len() * batch.len());
            for supplier in &active {
                for query in batch {
                    tasks.push((
                        supplier.supplier_id.clone(),
                        supplier.scraper.clone(),
                        supplier.strategy.clone(),
                        query.clone(),
                    ));
                }
            }

            let limits = self.limits;
            let results: Vec<(String, Result<Vec<PartRecord>, ScrapeError>)> =
                stream::iter(tasks)
                    .map(move |task| run_scrape_task(task, limits))
                    .buffer_unordered(self.settings.worker_pool_size)
                    .collect()
                    .await;

            let mut per_supplier: BTreeMap<String, BatchAccum> = active
                .iter()
                .map(|s| (s.supplier_id.clone(), BatchAccum::default()))
                .collect();
            let mut irrecoverable: HashSet<String> = HashSet::new();

            for (supplier_id, outcome) in results {
                let Some(accum) = per_supplier.get_mut(&supplier_id) else {
                    continue;
                };
                match outcome {
                    Ok(records) => {
                        accum.scraped += 1;
                        accum.records.extend(records);
                    }
                    Err(e) => {
                        accum.errors += 1;
                        if e.is_irrecoverable() {
                            irrecoverable.insert(supplier_id.clone());
                        }
                        debug!(%supplier_id, "scrape failed: {e}");
                    }
                }
            }

            for (supplier_id, accum) in per_supplier {
                let _ = self
                    .tracker
                    .advance(
                        &run_id,
                        &supplier_id,
                        ProgressDelta {
                            scraped: accum.scraped,
                            errors: accum.errors,
                            ..ProgressDelta::default()
                        },
                    )
                    .await;

                if accum.scraped == 0 {
                    continue;
                }
                match self.upsert_with_retry(&accum.records).await {
                    Ok(written) => {
                        debug!(%run_id, %supplier_id, written, "batch stored");
                        let _ = self
                            .tracker
                            .advance(
                                &run_id,
                                &supplier_id,
                                ProgressDelta {
                                    stored: accum.scraped,
                                    ..ProgressDelta::default()
                                },
                            )
                            .await;
                    }
                    Err(e) => {
                        warn!(%run_id, %supplier_id, "batch storage failed after retry: {e}");
                        let _ = self
                            .tracker
                            .advance(
                                &run_id,
                                &supplier_id,
                                ProgressDelta {
                                    errors: accum.scraped,
                                    ..ProgressDelta::default()
                                },
                            )
                            .await;
                    }
                }
            }

            if !irrecoverable.is_empty() {
                active.retain(|s| {
                    let keep = !irrecoverable.contains(&s.supplier_id);
                    if !keep {
                        warn!(
                            %run_id,
                            supplier_id = %s.supplier_id,
                            "supplier marked failed; excluded from remaining batches"
                        );
                    }
                    keep
                });
            }
        }

        let status = if active.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let _ = self.tracker.finish(&run_id, status).await;
    }

    /// Active strategy, or auto-detection from a sample fetch when none is
    /// stored. Failure here is irrecoverable for the supplier within this
    /// run.
    async fn resolve_strategy(
        &self,
        scraper: &dyn SupplierScraper,
        supplier_id: &str,
        probe: &str,
    ) -> Result<SelectorStrategy, ScrapeError> {
        match self.strategies.get_active(supplier_id).await {
            Ok(Some(strategy)) => return Ok(strategy),
            Ok(None) => {}
            Err(e) => warn!(supplier_id, "strategy lookup failed, trying detection: {e}"),
        }

        info!(supplier_id, "no active strategy; attempting auto-detection");
        let sample = scraper
            .fetch_sample(probe)
            .await
            .map_err(|e| ScrapeError::Detection {
                supplier_id: supplier_id.to_string(),
                source: DetectionError::UnusableSample {
                    reason: e.to_string(),
                },
            })?;

        let detected = self
            .detector
            .detect(&sample, supplier_id, scraper.search_url_template())
            .map_err(|source| ScrapeError::Detection {
                supplier_id: supplier_id.to_string(),
                source,
            })?;

        match self.strategies.set_strategy(detected.clone()).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!(supplier_id, "detected strategy could not be persisted: {e}");
                Ok(detected)
            }
        }
    }

    /// One retry with backoff; a batch that still fails is reported to the
    /// caller, who counts it and moves on.
    async fn upsert_with_retry(&self, records: &[PartRecord]) -> Result<u64, StorageError> {
        match self.parts.upsert_batch(records).await {
            Ok(written) => Ok(written),
            Err(first) => {
                warn!("upsert failed, retrying once: {first}");
                tokio::time::sleep(Duration::from_millis(self.settings.storage_retry_delay_ms))
                    .await;
                self.parts.upsert_batch(records).await
            }
        }
    }
}
