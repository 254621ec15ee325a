//! Selector strategies
//!
//! A strategy maps a supplier's search-result page onto part fields: one
//! CSS selector locating the repeated result block, plus per-field selectors
//! relative to that block. Strategies come from auto-detection or from a
//! manual mapping; a manual mapping always wins over a detected one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-field selectors, relative to the result block. A missing selector
/// leaves the field unmapped; scraping tolerates partial coverage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelectors {
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub purchase_link: Option<String>,
}

impl FieldSelectors {
    /// Number of mapped fields out of the five the scraper understands.
    pub fn mapped_count(&self) -> usize {
        [
            &self.part_number,
            &self.description,
            &self.price,
            &self.quantity,
            &self.purchase_link,
        ]
        .iter()
        .filter(|s| s.is_some())
        .count()
    }
}

/// Mapping from a supplier's page structure to structured part fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub supplier_id: String,
    /// Monotonically increasing per supplier; assigned by the store.
    pub version: i64,
    /// Search URL with a `{query}` placeholder.
    pub search_url_template: String,
    /// Selector locating one result block on the page.
    pub result_block_selector: String,
    pub fields: FieldSelectors,
    /// Mean per-field heuristic score from auto-detection, in `[0, 1]`.
    /// Manual mappings carry 1.0 by convention.
    pub detection_confidence: f64,
    pub is_manual_override: bool,
    pub created_at: DateTime<Utc>,
}

impl SelectorStrategy {
    /// A user-supplied mapping. Bypasses detection entirely.
    pub fn manual(
        supplier_id: impl Into<String>,
        search_url_template: impl Into<String>,
        result_block_selector: impl Into<String>,
        fields: FieldSelectors,
    ) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            version: 0,
            search_url_template: search_url_template.into(),
            result_block_selector: result_block_selector.into(),
            fields,
            detection_confidence: 1.0,
            is_manual_override: true,
            created_at: Utc::now(),
        }
    }

    /// Substitute the query into the search URL template, percent-encoded.
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url_template.replace("{query}", &encoded)
    }
}
