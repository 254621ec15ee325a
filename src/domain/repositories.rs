//! Repository interfaces consumed by the acquisition and matching core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::StorageError;
use crate::domain::part::{PartFilter, PartRecord};
use crate::domain::run::{RunState, RunStatus, SupplierProgress};
use crate::domain::strategy::SelectorStrategy;

/// Cache of scraped part observations, keyed `(supplier_id, part_number)`.
#[async_trait]
pub trait PartRepository: Send + Sync {
    /// Idempotent batch upsert. All rows in the batch commit atomically;
    /// returns the number of rows written.
    async fn upsert_batch(&self, records: &[PartRecord]) -> Result<u64, StorageError>;

    async fn query(&self, filter: &PartFilter) -> Result<Vec<PartRecord>, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;
}

/// Versioned selector strategies, exactly one active per supplier.
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn get_active(&self, supplier_id: &str) -> Result<Option<SelectorStrategy>, StorageError>;

    /// Store a new strategy version. Activates it unless the supplier has an
    /// active manual override and the incoming strategy is auto-detected, in
    /// which case the new version is retained inactive for audit. Returns
    /// the stored strategy with its assigned version.
    async fn set_strategy(
        &self,
        strategy: SelectorStrategy,
    ) -> Result<SelectorStrategy, StorageError>;

    /// All versions ever stored for a supplier, newest first.
    async fn history(&self, supplier_id: &str) -> Result<Vec<SelectorStrategy>, StorageError>;
}

/// Persisted run state. A crash mid-run leaves the last committed counters
/// inspectable; unfinished runs are reconciled by the caller, never resumed
/// here.
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: &RunState) -> Result<(), StorageError>;

    async fn update_status(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    async fn update_supplier_progress(
        &self,
        run_id: &str,
        supplier_id: &str,
        progress: &SupplierProgress,
    ) -> Result<(), StorageError>;

    async fn get(&self, run_id: &str) -> Result<Option<RunState>, StorageError>;

    /// Runs still marked running or pending, e.g. after a crash.
    async fn list_unfinished(&self) -> Result<Vec<RunState>, StorageError>;
}
