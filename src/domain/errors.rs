//! Error taxonomy
//!
//! Failures below the run level are absorbed into counters; only a run
//! where every supplier is irrecoverable surfaces as a failed run.

use thiserror::Error;

/// Why strategy auto-detection produced no strategy. A value, not an
/// exception path: callers branch on it.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("found {found} repeated result blocks, need at least {required}")]
    TooFewBlocks { found: usize, required: usize },

    #[error("detection confidence {confidence:.2} below floor {floor:.2}")]
    BelowConfidenceFloor { confidence: f64, floor: f64 },

    #[error("sample page could not be parsed: {reason}")]
    UnusableSample { reason: String },
}

/// Failure of one scrape call or of strategy resolution for a supplier.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network error, timeout, or non-2xx status. Counted; the supplier
    /// continues in later batches.
    #[error("fetch failed for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    /// The page fetched but the strategy yielded nothing usable.
    #[error("parse failure for supplier {supplier_id}: {reason}")]
    Parse { supplier_id: String, reason: String },

    /// No active strategy and auto-detection failed. Irrecoverable for the
    /// supplier within the current run.
    #[error("no usable strategy for supplier {supplier_id}: {source}")]
    Detection {
        supplier_id: String,
        #[source]
        source: DetectionError,
    },

    #[error("no active strategy for supplier {supplier_id}")]
    MissingStrategy { supplier_id: String },
}

impl ScrapeError {
    /// Irrecoverable errors exclude the supplier from the rest of the run.
    pub fn is_irrecoverable(&self) -> bool {
        matches!(self, Self::Detection { .. } | Self::MissingStrategy { .. })
    }
}

/// A cache-store operation could not commit.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{context}: {message}")]
    Inconsistent { context: String, message: String },
}

/// Terminal failure of a whole run, or a run that cannot start.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("all {supplier_count} suppliers in the work list are irrecoverable")]
    AllSuppliersFailed { supplier_count: usize },

    #[error("unknown run: {run_id}")]
    UnknownRun { run_id: String },

    #[error("unknown supplier: {supplier_id}")]
    UnknownSupplier { supplier_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
