//! Content rating normalization
//!
//! Maps the many regional rating systems onto one "N+" age chip.

use crate::config::Labels;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Label key shown when an item carries no usable rating
pub const NO_RATING_LABEL: &str = "noRating";

static NUMERIC_RATING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d{1,2})\+?$").expect("numeric rating pattern")
});

static UNRATED: &[&str] = &["", "NR", "N-R", "NOT-RATED", "UNRATED", "UR", "NONE"];

static GENERIC: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // US film
        ("G", "0+"),
        ("PG", "7+"),
        ("PG-13", "13+"),
        ("R", "17+"),
        ("NC-17", "18+"),
        ("X", "18+"),
        ("XXX", "18+"),
        ("AO", "18+"),
        ("APPROVED", "0+"),
        ("PASSED", "0+"),
        // US television
        ("TV-Y", "0+"),
        ("TV-Y7", "7+"),
        ("TV-Y7-FV", "7+"),
        ("TV-G", "0+"),
        ("TV-PG", "7+"),
        ("TV-14", "14+"),
        ("TV-MA", "17+"),
        // UK / Ireland
        ("U", "0+"),
        ("UC", "0+"),
        ("12A", "12+"),
        ("R18", "18+"),
        // Australia / New Zealand
        ("MA15+", "15+"),
        ("R18+", "18+"),
        ("X18+", "18+"),
        ("M", "15+"),
        // Japan
        ("PG12", "12+"),
        ("R15+", "15+"),
        // Misc
        ("ALL", "0+"),
        ("AL", "0+"),
        ("MG6", "6+"),
        ("C", "0+"),
        ("C8", "8+"),
        ("14A", "14+"),
        ("18A", "18+"),
        ("VM14", "14+"),
        ("VM18", "18+"),
        ("T", "0+"),
        ("UA", "12+"),
        ("7A", "7+"),
        ("13A", "13+"),
        ("APTA", "0+"),
        ("TP", "0+"),
    ])
});

/// Country-specific readings that differ from the generic table
static COUNTRY: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("KR-19", "18+"),
        ("KR-ALL", "0+"),
        ("DE-0", "0+"),
        ("BR-L", "0+"),
        ("BR-LIVRE", "0+"),
        ("FR-TP", "0+"),
        ("FR-U", "0+"),
        ("CA-G", "0+"),
        ("CA-PG", "8+"),
        ("NL-AL", "0+"),
        ("GB-PG", "8+"),
        ("UK-PG", "8+"),
        ("IE-PG", "8+"),
        ("AU-M", "15+"),
        ("AU-PG", "8+"),
        ("NZ-M", "16+"),
        ("IN-U", "0+"),
        ("IN-A", "18+"),
        ("SG-NC16", "16+"),
        ("SG-M18", "18+"),
        ("SG-R21", "21+"),
        ("PH-SPG", "13+"),
        ("US-R", "17+"),
    ])
});

fn canonical(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' { '-' } else { c })
        .collect()
}

/// Split "DE-16", "KR/19", "FR:U" into a country prefix and the local rating
fn split_country(rating: &str) -> Option<(&str, &str)> {
    let prefix = rating.get(..2)?;
    if !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let rest = rating.get(2..)?;
    let local = rest.strip_prefix(['-', '/', ':'])?;
    (!local.is_empty()).then_some((prefix, local))
}

fn lookup(rating: &str) -> Option<String> {
    if let Some(chip) = GENERIC.get(rating) {
        return Some(chip.to_string());
    }
    NUMERIC_RATING
        .captures(rating)
        .and_then(|caps| caps.get(1))
        .and_then(|age| age.as_str().parse::<u32>().ok())
        .map(|age| format!("{age}+"))
}

/// Normalize a raw content rating to an "N+" chip.
///
/// Unrated values yield an empty string. Ratings no table recognizes pass
/// through unchanged (trimmed).
pub fn normalize_rating(raw: &str) -> String {
    let rating = canonical(raw);
    if UNRATED.contains(&rating.as_str()) {
        return String::new();
    }
    if let Some(chip) = lookup(&rating) {
        return chip;
    }
    if let Some((country, local)) = split_country(&rating) {
        if let Some(chip) = COUNTRY.get(format!("{country}-{local}").as_str()) {
            return chip.to_string();
        }
        if UNRATED.contains(&local) {
            return String::new();
        }
        if let Some(chip) = lookup(local) {
            return chip;
        }
    }
    raw.trim().to_string()
}

/// Age chip text, or the "no rating" label when nothing usable is known
pub fn age_chip(official_rating: Option<&str>, labels: &Labels) -> String {
    let chip = normalize_rating(official_rating.unwrap_or(""));
    if chip.is_empty() {
        labels.get(NO_RATING_LABEL, "Not rated")
    } else {
        chip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_ratings() {
        assert_eq!(normalize_rating("PG-13"), "13+");
        assert_eq!(normalize_rating("pg 13"), "13+");
        assert_eq!(normalize_rating("R"), "17+");
        assert_eq!(normalize_rating("TV-MA"), "17+");
        assert_eq!(normalize_rating("tv_y7_fv"), "7+");
    }

    #[test]
    fn test_numeric_ratings() {
        assert_eq!(normalize_rating("15"), "15+");
        assert_eq!(normalize_rating("16+"), "16+");
        assert_eq!(normalize_rating(" 0 "), "0+");
    }

    #[test]
    fn test_country_prefixed() {
        assert_eq!(normalize_rating("DE-16"), "16+");
        assert_eq!(normalize_rating("KR-19"), "18+");
        assert_eq!(normalize_rating("fr/U"), "0+");
        assert_eq!(normalize_rating("GB:15"), "15+");
        assert_eq!(normalize_rating("US-NR"), "");
    }

    #[test]
    fn test_unrated_is_empty() {
        assert_eq!(normalize_rating(""), "");
        assert_eq!(normalize_rating("NR"), "");
        assert_eq!(normalize_rating("Not Rated"), "");
        assert_eq!(normalize_rating("unrated"), "");
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(normalize_rating(" Banned in Narnia "), "Banned in Narnia");
        assert_eq!(normalize_rating("K-Mystery"), "K-Mystery");
    }

    #[test]
    fn test_age_chip_uses_label_when_missing() {
        let labels: Labels = [(NO_RATING_LABEL.to_string(), "Sin clasificar".to_string())]
            .into_iter()
            .collect();
        assert_eq!(age_chip(None, &labels), "Sin clasificar");
        assert_eq!(age_chip(Some("NR"), &Labels::new()), "Not rated");
        assert_eq!(age_chip(Some("PG"), &labels), "7+");
    }
}
