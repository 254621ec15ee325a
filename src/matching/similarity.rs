//! Text similarity primitives for the matching engine
//!
//! Two signals are blended: normalized-Levenshtein similarity between part
//! numbers, and TF-IDF cosine similarity between description texts, with
//! document frequencies taken from the catalog's description corpus.

use std::collections::HashMap;

/// Lowercased alphanumeric tokens; everything else is a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Edit-distance similarity in `[0, 1]` between two already-normalized
/// strings. Empty input scores 0 against anything.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}

/// Document frequencies over a description corpus, reused across every
/// candidate scored for one query.
#[derive(Debug)]
pub struct TfIdfIndex {
    doc_count: usize,
    doc_freq: HashMap<String, usize>,
}

impl TfIdfIndex {
    pub fn build<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut doc_count = 0;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            doc_count += 1;
            let mut seen: Vec<String> = tokenize(doc);
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }
        Self {
            doc_count,
            doc_freq,
        }
    }

    /// Smoothed inverse document frequency; unseen terms get the maximum.
    fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0);
        (((1 + self.doc_count) as f64) / ((1 + df) as f64)).ln() + 1.0
    }

    fn vector(&self, text: &str) -> HashMap<String, f64> {
        let mut tf: HashMap<String, f64> = HashMap::new();
        for token in tokenize(text) {
            *tf.entry(token).or_insert(0.0) += 1.0;
        }
        for (term, weight) in tf.iter_mut() {
            *weight *= self.idf(term);
        }
        tf
    }

    /// Cosine similarity of the two texts' TF-IDF vectors, in `[0, 1]`.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let va = self.vector(a);
        let vb = self.vector(b);
        if va.is_empty() || vb.is_empty() {
            return 0.0;
        }
        let dot: f64 = va
            .iter()
            .filter_map(|(term, wa)| vb.get(term).map(|wb| wa * wb))
            .sum();
        let norm_a: f64 = va.values().map(|w| w * w).sum::<f64>().sqrt();
        let norm_b: f64 = vb.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}
