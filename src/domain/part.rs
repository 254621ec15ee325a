//! Part catalog entities
//!
//! A `PartRecord` is one observation of a component at a supplier. Records
//! are keyed by `(supplier_id, part_number)`; re-scraping the same part
//! supersedes the previous observation instead of duplicating it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One observation of a component at a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub supplier_id: String,
    /// Part number as listed by the supplier.
    pub part_number: String,
    /// Normalized manufacturer part number, when the listing exposes one.
    pub manufacturer_part_number: Option<String>,
    pub description: Option<String>,
    /// Units in stock; `None` when the supplier does not publish it.
    pub quantity_available: Option<i64>,
    pub unit_price: Option<f64>,
    /// ISO-ish currency tag for `unit_price` ("USD", "LKR", ...).
    pub currency: Option<String>,
    pub purchase_url: Option<String>,
    pub datasheet_url: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// Version of the selector strategy that produced this record.
    pub source_strategy_version: i64,
}

impl PartRecord {
    /// Manufacturer part number in normalized form, falling back to the
    /// supplier listing's part number.
    pub fn normalized_mpn(&self) -> String {
        let raw = self
            .manufacturer_part_number
            .as_deref()
            .unwrap_or(&self.part_number);
        normalize_part_number(raw)
    }

    /// Whether this observation is older than `max_age` as of `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.observed_at > max_age
    }

    pub fn in_stock(&self) -> bool {
        self.quantity_available.is_some_and(|q| q > 0)
    }
}

/// Canonical form used for part-number comparison: uppercase alphanumerics,
/// separators stripped. "rc-0805_10k" and "RC0805 10K" compare equal.
pub fn normalize_part_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// A normalized BOM line handed over by the file-import step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPart {
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity_requested: Option<u32>,
}

impl QueryPart {
    pub fn from_part_number(part_number: impl Into<String>) -> Self {
        Self {
            part_number: Some(part_number.into()),
            ..Self::default()
        }
    }

    /// Text used as the supplier search query: part number when present,
    /// otherwise the description.
    pub fn search_term(&self) -> Option<&str> {
        self.part_number
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.description.as_deref().filter(|s| !s.trim().is_empty()))
    }

    pub fn normalized_part_number(&self) -> Option<String> {
        self.part_number
            .as_deref()
            .map(normalize_part_number)
            .filter(|s| !s.is_empty())
    }
}

/// Catalog restriction applied before similarity scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartFilter {
    /// Restrict to these suppliers; `None` means all.
    pub suppliers: Option<Vec<String>>,
    pub in_stock_only: bool,
    /// Exclude observations older than this instant; `None` includes stale
    /// records.
    pub observed_after: Option<DateTime<Utc>>,
    /// Hard cap on the candidate set handed to the matcher.
    pub limit: Option<u32>,
}

/// A ranked candidate for a query part. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub record: PartRecord,
    /// Combined similarity in `[0, 1]`.
    pub score: f64,
    /// Normalized manufacturer part numbers were identical.
    pub is_exact: bool,
}
