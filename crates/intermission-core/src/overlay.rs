//! Overlay and badge content
//!
//! Plain data handed to [`crate::host::OverlaySurface`]. Everything
//! user-visible goes through [`Labels`] with a literal fallback.

use crate::{
    classifier::{age_chip, ClassificationResult},
    config::Labels,
    types::*,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;

/// Genres shown in the metadata row
const MAX_GENRES: usize = 3;

/// The brief rating/descriptor indicator shown after playback begins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeContent {
    pub item_id: ItemId,
    pub age_chip: String,
    pub descriptors: Vec<String>,
}

impl BadgeContent {
    /// `None` when there is neither a rating nor a descriptor to show
    pub fn from_classification(item_id: ItemId, result: &ClassificationResult) -> Option<Self> {
        if result.age_chip.is_empty() && result.descriptors.is_empty() {
            return None;
        }
        Some(Self {
            item_id,
            age_chip: result.age_chip.clone(),
            descriptors: result.labels().into_iter().map(String::from).collect(),
        })
    }

    pub fn line(&self) -> String {
        std::iter::once(self.age_chip.as_str())
            .chain(self.descriptors.iter().map(String::as_str))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" · ")
    }
}

/// The advisory panel shown while paused
#[derive(Debug, Clone, Serialize)]
pub struct OverlayContent {
    pub item_id: ItemId,
    pub heading: String,
    pub title: String,
    /// "Series · S2E5" for episodes
    pub episode: Option<String>,
    /// Year, runtime, community rating, genres
    pub meta: Vec<String>,
    pub age_chip: String,
    pub descriptors: Vec<String>,
    pub synopsis: Option<String>,
    pub ends_at: Option<String>,
    pub rail_title: String,
    pub recommendations: Vec<ItemSummary>,
}

impl OverlayContent {
    pub fn build(
        details: &ItemDetails,
        classification: &ClassificationResult,
        recommendations: &[ItemSummary],
        remaining: Option<Duration>,
        now: DateTime<Local>,
        labels: &Labels,
    ) -> Self {
        let title = if details.name.trim().is_empty() {
            labels.get("untitled", "Untitled")
        } else {
            details.name.clone()
        };

        Self {
            item_id: details.item_id(),
            heading: labels.get("pausedHeading", "You're watching"),
            title,
            episode: episode_line(details),
            meta: meta_row(details),
            age_chip: age_chip(details.official_rating.as_deref(), labels),
            descriptors: classification
                .labels()
                .into_iter()
                .map(String::from)
                .collect(),
            synopsis: details
                .overview
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(String::from),
            ends_at: remaining
                .and_then(|left| ends_at(now, left))
                .map(|time| format!("{} {}", labels.get("endsAt", "Ends at"), time)),
            rail_title: labels.get("moreLikeThis", "More like this"),
            recommendations: recommendations.to_vec(),
        }
    }

    pub fn descriptor_line(&self) -> String {
        self.descriptors.join(" · ")
    }
}

fn episode_line(details: &ItemDetails) -> Option<String> {
    if !details.is_episode() {
        return None;
    }
    let marker = match (details.parent_index_number, details.index_number) {
        (Some(season), Some(episode)) => Some(format!("S{season}E{episode}")),
        (None, Some(episode)) => Some(format!("E{episode}")),
        _ => None,
    };
    let parts: Vec<String> = details
        .series_name
        .iter()
        .filter(|name| !name.trim().is_empty())
        .cloned()
        .chain(marker)
        .collect();
    (!parts.is_empty()).then(|| parts.join(" · "))
}

fn meta_row(details: &ItemDetails) -> Vec<String> {
    let mut meta = Vec::new();
    if let Some(year) = details.production_year.filter(|year| *year > 0) {
        meta.push(year.to_string());
    }
    if let Some(runtime) = details.runtime() {
        meta.push(format_runtime(runtime));
    }
    if let Some(rating) = details.community_rating.filter(|r| r.is_finite() && *r > 0.0) {
        meta.push(format!("★ {rating:.1}"));
    }
    let genres: Vec<&str> = details
        .genres
        .iter()
        .map(|genre| genre.trim())
        .filter(|genre| !genre.is_empty())
        .take(MAX_GENRES)
        .collect();
    if !genres.is_empty() {
        meta.push(genres.join(", "));
    }
    meta
}

/// "1h 52m" / "48m"
pub fn format_runtime(runtime: Duration) -> String {
    let minutes = (runtime.as_secs() + 30) / 60;
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

fn ends_at(now: DateTime<Local>, remaining: Duration) -> Option<String> {
    let remaining = chrono::Duration::from_std(remaining).ok()?;
    let end = now.checked_add_signed(remaining)?;
    Some(end.format("%H:%M").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use chrono::TimeZone;

    fn episode() -> ItemDetails {
        ItemDetails {
            id: "ep-1".into(),
            name: "Pilot".into(),
            item_type: Some("Episode".into()),
            series_name: Some("The Wire".into()),
            parent_index_number: Some(1),
            index_number: Some(1),
            production_year: Some(2002),
            run_time_ticks: Some(62 * 60 * TICKS_PER_SECOND),
            community_rating: Some(8.66),
            official_rating: Some("TV-MA".into()),
            overview: Some("  A drug case begins.  ".into()),
            tags: vec!["police".into(), "drug trade".into()],
            genres: vec!["Crime".into(), "Drama".into(), "Thriller".into(), "Mystery".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_runtime() {
        assert_eq!(format_runtime(Duration::from_secs(48 * 60)), "48m");
        assert_eq!(format_runtime(Duration::from_secs(112 * 60)), "1h 52m");
        assert_eq!(format_runtime(Duration::from_secs(120 * 60)), "2h");
    }

    #[test]
    fn test_overlay_rows() {
        let details = episode();
        let classification = Classifier::default().classify(&details);
        let now = Local.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let overlay = OverlayContent::build(
            &details,
            &classification,
            &[],
            Some(Duration::from_secs(30 * 60)),
            now,
            &Labels::new(),
        );

        assert_eq!(overlay.title, "Pilot");
        assert_eq!(overlay.episode.as_deref(), Some("The Wire · S1E1"));
        assert_eq!(overlay.meta, vec!["2002", "1h 2m", "★ 8.7", "Crime, Drama, Thriller"]);
        assert_eq!(overlay.age_chip, "17+");
        assert_eq!(overlay.synopsis.as_deref(), Some("A drug case begins."));
        assert_eq!(overlay.ends_at.as_deref(), Some("Ends at 20:30"));
        assert!(overlay.descriptors.len() <= 2);
    }

    #[test]
    fn test_overlay_labels_and_missing_rating() {
        let details = ItemDetails {
            id: "m".into(),
            ..Default::default()
        };
        let labels: Labels = [
            ("untitled".to_string(), "Sans titre".to_string()),
            ("noRating".to_string(), "NR".to_string()),
        ]
        .into_iter()
        .collect();
        let classification = Classifier::default().classify(&details);
        let overlay =
            OverlayContent::build(&details, &classification, &[], None, Local::now(), &labels);
        assert_eq!(overlay.title, "Sans titre");
        assert_eq!(overlay.age_chip, "NR");
        assert!(overlay.episode.is_none());
        assert!(overlay.ends_at.is_none());
        assert_eq!(overlay.rail_title, "More like this");
    }

    #[test]
    fn test_badge_content() {
        let details = episode();
        let classification = Classifier::default().classify(&details);
        let badge = BadgeContent::from_classification(details.item_id(), &classification).unwrap();
        assert!(badge.line().starts_with("17+ · "));

        let empty = Classifier::default().classify(&ItemDetails::default());
        assert!(BadgeContent::from_classification(ItemId::from("x"), &empty).is_none());
    }
}
