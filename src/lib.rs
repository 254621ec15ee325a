//! partscout - electronic component sourcing engine
//!
//! Scrapes pricing and availability from multiple suppliers using
//! auto-detected or manually mapped selector strategies, caches the
//! observations in SQLite, and matches BOM lines against the cached
//! catalog with a weighted similarity score. Scraping runs on a background
//! task in bounded batches with persisted progress; matching is synchronous
//! and deterministic.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod matching;

#[cfg(test)]
pub mod test_utils;

pub use application::{BatchRunner, CatalogFilter, ProgressTracker, RunHandle, SourcingService};
pub use domain::part::{MatchResult, PartFilter, PartRecord, QueryPart};
pub use domain::run::{RunState, RunStatus, SupplierProgress};
pub use domain::strategy::{FieldSelectors, SelectorStrategy};
pub use infrastructure::config::AppConfig;
pub use matching::MatchingEngine;
