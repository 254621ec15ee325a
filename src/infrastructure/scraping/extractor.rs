//! Strategy-driven extraction of part records from a result page
//!
//! Tolerates partial field coverage: any block that yields a usable part
//! number becomes a record, missing fields stay null, and blocks without a
//! part number are skipped and counted, never fatal.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::domain::errors::ScrapeError;
use crate::domain::part::PartRecord;
use crate::domain::strategy::SelectorStrategy;

static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(rs\.?|lkr|usd|eur|gbp|\$|€|£)\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
        .expect("price regex")
});

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9,]*").expect("number regex"));

static A_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("a selector"));

/// Records extracted from one page, plus how many blocks were skipped for
/// lacking a usable part number.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub records: Vec<PartRecord>,
    pub skipped_blocks: usize,
}

/// Parse one search-results page with the strategy's selectors.
pub fn extract_records(
    html: &str,
    strategy: &SelectorStrategy,
    base_url: &str,
    max_results: usize,
    observed_at: DateTime<Utc>,
) -> Result<ExtractionOutcome, ScrapeError> {
    let block_selector =
        Selector::parse(&strategy.result_block_selector).map_err(|e| ScrapeError::Parse {
            supplier_id: strategy.supplier_id.clone(),
            reason: format!(
                "invalid result block selector '{}': {e}",
                strategy.result_block_selector
            ),
        })?;

    let part_number_sel = compile_field(&strategy.fields.part_number, "part_number");
    let description_sel = compile_field(&strategy.fields.description, "description");
    let price_sel = compile_field(&strategy.fields.price, "price");
    let quantity_sel = compile_field(&strategy.fields.quantity, "quantity");
    let link_sel = compile_field(&strategy.fields.purchase_link, "purchase_link");

    let document = Html::parse_document(html);
    let mut records = Vec::new();
    let mut skipped_blocks = 0;

    for block in document.select(&block_selector) {
        if records.len() >= max_results {
            break;
        }

        let Some(part_number) = part_number_sel
            .as_ref()
            .and_then(|sel| text_of(&block, sel))
        else {
            skipped_blocks += 1;
            continue;
        };

        let description = description_sel.as_ref().and_then(|sel| text_of(&block, sel));
        let (unit_price, currency) = price_sel
            .as_ref()
            .and_then(|sel| text_of(&block, sel))
            .and_then(|text| parse_price(&text))
            .map_or((None, None), |(amount, code)| (Some(amount), code));
        let quantity_available = quantity_sel
            .as_ref()
            .and_then(|sel| text_of(&block, sel))
            .and_then(|text| parse_quantity(&text));
        let purchase_url = link_sel
            .as_ref()
            .and_then(|sel| href_of(&block, sel))
            .and_then(|href| resolve_url(&href, base_url));

        records.push(PartRecord {
            supplier_id: strategy.supplier_id.clone(),
            part_number,
            manufacturer_part_number: None,
            description,
            quantity_available,
            unit_price,
            currency,
            purchase_url,
            datasheet_url: None,
            observed_at,
            source_strategy_version: strategy.version,
        });
    }

    if skipped_blocks > 0 {
        debug!(
            supplier_id = %strategy.supplier_id,
            skipped_blocks,
            "skipped result blocks without a part number"
        );
    }

    Ok(ExtractionOutcome {
        records,
        skipped_blocks,
    })
}

fn compile_field(selector: &Option<String>, field: &str) -> Option<Selector> {
    let raw = selector.as_deref()?;
    match Selector::parse(raw) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!(field, selector = raw, "ignoring invalid field selector: {e}");
            None
        }
    }
}

fn text_of(block: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    block
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn href_of(block: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    let el = block.select(selector).next()?;
    if let Some(href) = el.value().attr("href") {
        return Some(href.to_string());
    }
    el.select(&A_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// `"$1,234.50"` → `(1234.50, Some("USD"))`. A bare number parses with no
/// currency tag.
pub fn parse_price(text: &str) -> Option<(f64, Option<String>)> {
    if let Some(caps) = PRICE_RE.captures(text) {
        let amount: f64 = caps[2].replace(',', "").parse().ok()?;
        let code = match caps[1].to_ascii_lowercase().as_str() {
            "$" | "usd" => "USD",
            "€" | "eur" => "EUR",
            "£" | "gbp" => "GBP",
            "rs" | "rs." | "lkr" => "LKR",
            _ => return Some((amount, None)),
        };
        return Some((amount, Some(code.to_string())));
    }
    let m = NUMBER_RE.find(text)?;
    // Reject text that is mostly words around a number ("ships in 3 days").
    if text.trim().len() > m.as_str().len() + 4 {
        return None;
    }
    let amount: f64 = text
        .trim()
        .replace(',', "")
        .parse()
        .ok()?;
    Some((amount, None))
}

/// Stock text → units. "Out of stock" is a known zero, prose without a
/// number is unknown.
pub fn parse_quantity(text: &str) -> Option<i64> {
    let lowered = text.to_lowercase();
    if lowered.contains("out of stock") || lowered.contains("sold out") {
        return Some(0);
    }
    let m = NUMBER_RE.find(&lowered)?;
    m.as_str().replace(',', "").parse::<i64>().ok().map(|n| n.max(0))
}

fn resolve_url(href: &str, base_url: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .ok()
}
