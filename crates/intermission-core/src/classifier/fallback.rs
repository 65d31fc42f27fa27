//! Free-text keyword fallback
//!
//! Used when neither tags nor genres produce a descriptor. Matching is
//! word-boundary safe: "war" hits "a war epic" but not "warden".

use super::buckets::BUCKETS;
use crate::types::ItemDetails;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub const OVERVIEW_WEIGHT: f64 = 1.0;
pub const TAGLINE_WEIGHT: f64 = 0.6;
pub const TAG_WEIGHT: f64 = 1.0;
pub const STUDIO_WEIGHT: f64 = 0.3;

/// A bucket must accumulate strictly more than this to qualify
pub const MIN_TEXT_SCORE: f64 = 0.9;

struct BucketPatterns {
    words: Option<Regex>,
    negatives: Option<Regex>,
}

static PATTERNS: Lazy<Vec<BucketPatterns>> = Lazy::new(|| {
    BUCKETS
        .iter()
        .map(|bucket| BucketPatterns {
            words: alternation(bucket.fallback_words),
            negatives: alternation(bucket.negatives),
        })
        .collect()
});

fn alternation(words: &[&str]) -> Option<Regex> {
    if words.is_empty() {
        return None;
    }
    let body = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{body})\b")).ok()
}

fn count(pattern: &Option<Regex>, text: &str) -> usize {
    match pattern {
        Some(regex) if !text.is_empty() => regex.find_iter(text).count(),
        _ => 0,
    }
}

fn distinct(pattern: &Option<Regex>, text: &str) -> usize {
    let Some(regex) = pattern else {
        return 0;
    };
    regex
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

/// Weighted per-bucket scores over overview, taglines, tags and studios
pub fn classify_text(item: &ItemDetails, penalty: f64) -> Vec<f64> {
    let overview = item.overview.as_deref().unwrap_or("");
    let taglines = item.taglines.join("\n");
    let tags = item.tags.join("\n");
    let studios = item
        .studios
        .iter()
        .map(|studio| studio.name.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let negative_text = format!("{overview}\n{tags}");

    let fields = [
        (overview, OVERVIEW_WEIGHT),
        (taglines.as_str(), TAGLINE_WEIGHT),
        (tags.as_str(), TAG_WEIGHT),
        (studios.as_str(), STUDIO_WEIGHT),
    ];

    PATTERNS
        .iter()
        .map(|patterns| {
            let score: f64 = fields
                .iter()
                .map(|(text, weight)| count(&patterns.words, text) as f64 * weight)
                .sum();
            if score <= 0.0 {
                return score;
            }
            score - distinct(&patterns.negatives, &negative_text) as f64 * penalty
        })
        .collect()
}
