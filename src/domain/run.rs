//! Run and progress records
//!
//! State of one batch-runner invocation. Counters only ever grow, and
//! `stored <= scraped <= requested` holds per supplier at every observation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Per-supplier counters. Counts queries (work-list items), not records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierProgress {
    /// Queries dispatched to this supplier so far.
    pub requested: u64,
    /// Queries whose fetch and parse completed.
    pub scraped: u64,
    /// Queries whose records were committed to the cache.
    pub stored: u64,
    /// Queries that failed at fetch, parse, or storage.
    pub errors: u64,
}

/// Increments applied in one `advance` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressDelta {
    pub requested: u64,
    pub scraped: u64,
    pub stored: u64,
    pub errors: u64,
}

impl ProgressDelta {
    pub fn requested(n: u64) -> Self {
        Self {
            requested: n,
            ..Self::default()
        }
    }
}

/// Snapshot of one run. Polled by external consumers, mutated only through
/// the progress tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    /// Work-list length recorded at creation.
    pub parts_requested: u64,
    pub suppliers: BTreeMap<String, SupplierProgress>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, supplier_ids: &[String], parts_requested: u64) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            status: RunStatus::Pending,
            parts_requested,
            suppliers: supplier_ids
                .iter()
                .map(|s| (s.clone(), SupplierProgress::default()))
                .collect(),
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn apply(&mut self, supplier_id: &str, delta: ProgressDelta) {
        let entry = self.suppliers.entry(supplier_id.to_string()).or_default();
        entry.requested += delta.requested;
        entry.scraped += delta.scraped;
        entry.stored += delta.stored;
        entry.errors += delta.errors;
        debug_assert!(entry.stored <= entry.scraped && entry.scraped <= entry.requested);
        self.updated_at = Utc::now();
    }

    pub fn total_errors(&self) -> u64 {
        self.suppliers.values().map(|p| p.errors).sum()
    }

    pub fn total_stored(&self) -> u64 {
        self.suppliers.values().map(|p| p.stored).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_supplier() {
        let mut run = RunState::new("r1", &["a".into(), "b".into()], 10);
        run.apply("a", ProgressDelta::requested(5));
        run.apply(
            "a",
            ProgressDelta {
                scraped: 4,
                stored: 4,
                errors: 1,
                ..ProgressDelta::default()
            },
        );
        let a = run.suppliers["a"];
        assert_eq!(a.requested, 5);
        assert_eq!(a.scraped, 4);
        assert_eq!(a.stored, 4);
        assert_eq!(a.errors, 1);
        assert_eq!(run.suppliers["b"], SupplierProgress::default());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }
}
