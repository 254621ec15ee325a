//! Similarity-ranking engine
//!
//! Ranks catalog records against a query part: an identical normalized
//! manufacturer part number short-circuits to an exact match at score 1.0;
//! everything else gets a weighted blend of part-number edit-distance
//! similarity and description TF-IDF cosine similarity. Output ordering is
//! fully deterministic for a fixed catalog snapshot.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::part::{normalize_part_number, MatchResult, PartRecord, QueryPart};
use crate::matching::similarity::{token_similarity, TfIdfIndex};

/// Blend weights. Defaults favor part-number similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchWeights {
    pub token: f64,
    pub tfidf: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            token: 0.6,
            tfidf: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchingEngine {
    weights: MatchWeights,
    min_score: f64,
}

impl MatchingEngine {
    pub fn new(weights: MatchWeights, min_score: f64) -> Self {
        Self {
            weights,
            min_score: min_score.clamp(0.0, 1.0),
        }
    }

    /// Rank `catalog` against `query`, best first, capped at `top_k`.
    /// An empty catalog yields an empty result, never an error.
    pub fn rank(&self, query: &QueryPart, catalog: &[PartRecord], top_k: usize) -> Vec<MatchResult> {
        if catalog.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let index = TfIdfIndex::build(
            catalog
                .iter()
                .filter_map(|r| r.description.as_deref()),
        );
        let query_pn = query.normalized_part_number();
        let query_desc = query.description.as_deref().unwrap_or("");

        let mut results: Vec<MatchResult> = catalog
            .iter()
            .map(|record| self.score_one(record, query_pn.as_deref(), query_desc, &index))
            .filter(|m| m.is_exact || m.score >= self.min_score)
            .collect();

        results.sort_by(|a, b| {
            b.is_exact
                .cmp(&a.is_exact)
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| cmp_price(&a.record, &b.record))
                .then_with(|| a.record.part_number.cmp(&b.record.part_number))
        });
        results.truncate(top_k);

        debug!(
            candidates = catalog.len(),
            kept = results.len(),
            "ranked query part"
        );
        results
    }

    fn score_one(
        &self,
        record: &PartRecord,
        query_pn: Option<&str>,
        query_desc: &str,
        index: &TfIdfIndex,
    ) -> MatchResult {
        let record_mpn = record.normalized_mpn();

        if let Some(qpn) = query_pn {
            if !qpn.is_empty() && qpn == record_mpn {
                return MatchResult {
                    record: record.clone(),
                    score: 1.0,
                    is_exact: true,
                };
            }
        }

        let tfidf_sim = match record.description.as_deref() {
            Some(desc) if !query_desc.is_empty() => index.similarity(query_desc, desc),
            _ => 0.0,
        };

        // Without a query part number the description signal carries the
        // whole score.
        let score = match query_pn {
            Some(qpn) if !qpn.is_empty() => {
                let listed = normalize_part_number(&record.part_number);
                let token_sim = token_similarity(qpn, &record_mpn)
                    .max(token_similarity(qpn, &listed));
                self.weights.token * token_sim + self.weights.tfidf * tfidf_sim
            }
            _ => tfidf_sim,
        };

        MatchResult {
            record: record.clone(),
            score: score.clamp(0.0, 1.0),
            is_exact: false,
        }
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(MatchWeights::default(), 0.3)
    }
}

/// Ties broken by lower price; records without a price sort after priced
/// ones.
fn cmp_price(a: &PartRecord, b: &PartRecord) -> std::cmp::Ordering {
    match (a.unit_price, b.unit_price) {
        (Some(pa), Some(pb)) => pa.total_cmp(&pb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}
