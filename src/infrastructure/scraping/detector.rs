//! Selector strategy auto-detection
//!
//! Scans a sample search-results page for repeated block structures, scores
//! candidate sub-elements against expected field shapes, and emits a
//! strategy whose confidence is the mean per-field score. Detection failure
//! is a value the caller branches on, not an exception path.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::errors::DetectionError;
use crate::domain::strategy::{FieldSelectors, SelectorStrategy};

static PRICE_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(rs\.?|lkr|usd|eur|gbp|\$|€|£)\s*[0-9][0-9,]*(\.[0-9]+)?")
        .expect("price shape regex")
});

static QUANTITY_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([0-9][0-9,]*\s*(in\s+stock|available|pcs|units))|((stock|qty|quantity)\s*:?\s*[0-9])|out\s+of\s+stock")
        .expect("quantity shape regex")
});

static PART_NUMBER_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_/\.]{3,31}$").expect("part number regex"));

/// A candidate signature must match at least this fraction of blocks to be
/// mapped; weaker candidates leave the field null.
const MIN_FIELD_SCORE: f64 = 0.25;

/// How many repeated-block groups are scored in full, largest first.
const MAX_GROUP_CANDIDATES: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum number of result blocks sharing a signature.
    pub min_repeated_blocks: usize,
    /// Strategies below this mean per-field score are rejected.
    pub confidence_floor: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_repeated_blocks: 4,
            confidence_floor: 0.35,
        }
    }
}

pub struct StrategyDetector {
    config: DetectionConfig,
}

impl StrategyDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Detect a selector strategy from a sample page. The search URL
    /// template is supplied by the caller; detection only maps structure.
    pub fn detect(
        &self,
        sample_html: &str,
        supplier_id: &str,
        search_url_template: &str,
    ) -> Result<SelectorStrategy, DetectionError> {
        if sample_html.trim().is_empty() {
            return Err(DetectionError::UnusableSample {
                reason: "empty sample page".into(),
            });
        }

        let document = Html::parse_document(sample_html);
        let groups = repeated_block_groups(&document);

        let qualifying: Vec<&BlockGroup> = groups
            .iter()
            .filter(|g| g.blocks.len() >= self.config.min_repeated_blocks)
            .take(MAX_GROUP_CANDIDATES)
            .collect();

        if qualifying.is_empty() {
            let found = groups.first().map_or(0, |g| g.blocks.len());
            return Err(DetectionError::TooFewBlocks {
                found,
                required: self.config.min_repeated_blocks,
            });
        }

        let mut best: Option<(f64, &BlockGroup, FieldSelectors)> = None;
        for group in qualifying {
            let (fields, confidence) = score_group(group);
            let better = match &best {
                None => true,
                Some((best_confidence, best_group, _)) => {
                    confidence > *best_confidence
                        || (confidence == *best_confidence
                            && group.blocks.len() > best_group.blocks.len())
                }
            };
            if better {
                best = Some((confidence, group, fields));
            }
        }

        let (confidence, group, fields) =
            best.expect("at least one qualifying group was scored");

        debug!(
            supplier_id,
            block_selector = %group.signature,
            blocks = group.blocks.len(),
            confidence,
            "detection candidate"
        );

        if confidence < self.config.confidence_floor {
            return Err(DetectionError::BelowConfidenceFloor {
                confidence,
                floor: self.config.confidence_floor,
            });
        }

        Ok(SelectorStrategy {
            supplier_id: supplier_id.to_string(),
            version: 0,
            search_url_template: search_url_template.to_string(),
            result_block_selector: group.signature.clone(),
            fields,
            detection_confidence: confidence,
            is_manual_override: false,
            created_at: Utc::now(),
        })
    }
}

impl Default for StrategyDetector {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

struct BlockGroup<'a> {
    signature: String,
    blocks: Vec<ElementRef<'a>>,
}

/// CSS-usable signature for an element: tag plus its sorted classes.
/// Classes with characters outside the safe identifier set are dropped.
fn signature_of(el: &ElementRef<'_>) -> Option<String> {
    let tag = el.value().name();
    let mut classes: Vec<&str> = el
        .value()
        .classes()
        .filter(|c| is_css_identifier(c))
        .collect();
    classes.sort_unstable();

    if classes.is_empty() {
        // Bare repeated tags are only meaningful for list-ish containers.
        if matches!(tag, "li" | "tr" | "article") {
            Some(tag.to_string())
        } else {
            None
        }
    } else {
        Some(format!("{tag}.{}", classes.join(".")))
    }
}

fn is_css_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Group elements by `(parent signature, own signature)` and return groups
/// largest first with deterministic tie order.
fn repeated_block_groups(document: &Html) -> Vec<BlockGroup<'_>> {
    let all = Selector::parse("*").expect("universal selector");
    let mut grouped: HashMap<(String, String), Vec<ElementRef<'_>>> = HashMap::new();

    for el in document.select(&all) {
        let Some(signature) = signature_of(&el) else {
            continue;
        };
        let parent_signature = el
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| {
                signature_of(&p).unwrap_or_else(|| p.value().name().to_string())
            })
            .unwrap_or_default();
        grouped
            .entry((parent_signature, signature))
            .or_default()
            .push(el);
    }

    let mut groups: Vec<BlockGroup<'_>> = grouped
        .into_iter()
        .map(|((_, signature), blocks)| BlockGroup { signature, blocks })
        .collect();
    groups.sort_by(|a, b| {
        b.blocks
            .len()
            .cmp(&a.blocks.len())
            .then_with(|| a.signature.cmp(&b.signature))
    });
    groups
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    PartNumber,
    Description,
    Price,
    Quantity,
    PurchaseLink,
}

const FIELDS: [Field; 5] = [
    Field::PartNumber,
    Field::Description,
    Field::Price,
    Field::Quantity,
    Field::PurchaseLink,
];

fn matches_field(field: Field, el: &ElementRef<'_>, text: &str) -> bool {
    match field {
        Field::PartNumber => PART_NUMBER_SHAPE_RE.is_match(text) && text.contains(|c: char| c.is_ascii_digit()),
        Field::Description => (15..=300).contains(&text.len()) && text.contains(' '),
        Field::Price => PRICE_SHAPE_RE.is_match(text),
        Field::Quantity => QUANTITY_SHAPE_RE.is_match(text),
        Field::PurchaseLink => el.value().name() == "a" && el.value().attr("href").is_some(),
    }
}

/// Score every descendant signature of the group's blocks against each
/// field shape; a signature's score is the fraction of blocks in which it
/// matches. Confidence is the mean of the five best per-field scores.
fn score_group(group: &BlockGroup<'_>) -> (FieldSelectors, f64) {
    let total_blocks = group.blocks.len();
    let mut hits: HashMap<Field, HashMap<String, usize>> = HashMap::new();

    for block in &group.blocks {
        let mut seen: HashMap<Field, HashSet<String>> = HashMap::new();
        for node in block.descendants().skip(1) {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            let Some(signature) = signature_of(&el) else {
                continue;
            };
            let text = el.text().collect::<String>().trim().to_string();
            for field in FIELDS {
                if matches_field(field, &el, &text) {
                    seen.entry(field).or_default().insert(signature.clone());
                }
            }
        }
        for (field, signatures) in seen {
            let counts = hits.entry(field).or_default();
            for signature in signatures {
                *counts.entry(signature).or_insert(0) += 1;
            }
        }
    }

    let mut best_scores = [0.0f64; 5];
    let mut selectors: [Option<String>; 5] = Default::default();
    for (i, field) in FIELDS.iter().enumerate() {
        if let Some(counts) = hits.get(field) {
            // Deterministic tie-break on the selector string.
            let mut candidates: Vec<(&String, &usize)> = counts.iter().collect();
            candidates.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            if let Some((signature, count)) = candidates.first() {
                let score = **count as f64 / total_blocks as f64;
                best_scores[i] = score;
                if score >= MIN_FIELD_SCORE {
                    selectors[i] = Some((*signature).clone());
                }
            }
        }
    }

    let confidence = best_scores.iter().sum::<f64>() / FIELDS.len() as f64;
    let [part_number, description, price, quantity, purchase_link] = selectors;
    (
        FieldSelectors {
            part_number,
            description,
            price,
            quantity,
            purchase_link,
        },
        confidence,
    )
}
