//! Token estimation and advisory cache scores.
//!
//! The estimate only has to be reproducible: the same text always yields
//! the same count. It does not track any real tokenizer.

use crate::models::{CacheableCandidate, render_value};
use serde_json::Value;

/// Characters that each count as one extra token.
const PUNCTUATION: [char; 8] = [',', '.', ':', ';', '{', '}', '[', ']'];

/// Categories that make custom data more valuable to cache.
const HIGH_VALUE_CATEGORIES: [&str; 4] =
    ["ProjectGlossary", "Architecture", "Requirements", "Specifications"];

/// Key fragments that make custom data more valuable to cache.
const HIGH_VALUE_KEYS: [&str; 5] = ["config", "schema", "template", "pattern", "standard"];

/// Estimates the token count of `text`.
///
/// Words plus punctuation marks, scaled up for longer content. Empty or
/// whitespace-only text is 0 tokens.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count()
        + text.chars().filter(|c| PUNCTUATION.contains(c)).count();
    if words == 0 {
        return 0;
    }

    let mut tokens = (words * 4).max(1);
    if tokens < 25 {
        tokens = words.max(25);
    }
    if words > 50 {
        tokens = tokens * 22 / 10;
    }
    if words > 500 {
        tokens = tokens * 13 / 10;
    }
    tokens
}

/// Returns the size used for cache decisions: string values by length,
/// everything else by its compact JSON length.
#[must_use]
pub fn content_size(value: &Value) -> usize {
    render_value(value).chars().count()
}

/// Scores a custom datum's value for caching, from 0 to 100.
#[must_use]
pub fn custom_data_cache_score(
    value: &Value,
    category: &str,
    key: &str,
    cache_hint: Option<bool>,
) -> u32 {
    let size = content_size(value);
    let mut score = match size {
        s if s > 2000 => 30,
        s if s > 1000 => 20,
        s if s > 500 => 10,
        _ => 0,
    };
    if HIGH_VALUE_CATEGORIES.contains(&category) {
        score += 25;
    }
    let key = key.to_lowercase();
    if HIGH_VALUE_KEYS.iter().any(|k| key.contains(k)) {
        score += 15;
    }
    if cache_hint == Some(true) {
        score += 20;
    }
    score.min(100)
}

/// Priority-weighted mean score of a candidate list, from 0 to 100.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_cache_score(candidates: &[CacheableCandidate]) -> f64 {
    let (total, weights) = candidates.iter().fold((0.0, 0.0), |(total, weights), c| {
        let weight = c.tier.weight();
        let item = (c.estimated_tokens as f64 / 100.0 * weight).min(100.0);
        (total + item * weight, weights + weight)
    });
    if weights > 0.0 {
        (total / weights).min(100.0)
    } else {
        0.0
    }
}
