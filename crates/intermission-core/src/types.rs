//! Core types for Intermission

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Server ticks per second (100ns units)
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Catalog item identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a GUID in either hyphenated or simple form, normalized to simple lowercase
    pub fn from_guid(raw: &str) -> Option<Self> {
        Uuid::try_parse(raw.trim())
            .ok()
            .map(|uuid| Self(uuid.simple().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server + user identity used to invalidate cached entries on a context switch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScopeStamp {
    pub server_id: String,
    pub user_id: String,
}

impl ScopeStamp {
    pub fn new(server_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for ScopeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.server_id, self.user_id)
    }
}

/// Identity of a host media element, stable for the element's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// Null-tolerant deserializer: `null` or a missing field becomes the default value
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Studio reference on an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StudioRef {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    pub id: Option<String>,
}

/// Media stream descriptor (audio/video/subtitle)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaStream {
    #[serde(rename = "Type", deserialize_with = "nullable")]
    pub stream_type: String,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub display_title: Option<String>,
}

/// Media source attached to an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MediaSourceRef {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
}

/// Per-user progress data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserItemData {
    pub playback_position_ticks: Option<u64>,
    pub played_percentage: Option<f64>,
    pub played: bool,
}

/// Full item details as returned by the metadata service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemDetails {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    pub series_name: Option<String>,
    pub parent_index_number: Option<u32>,
    pub index_number: Option<u32>,
    pub production_year: Option<i32>,
    pub run_time_ticks: Option<u64>,
    pub community_rating: Option<f64>,
    pub official_rating: Option<String>,
    pub overview: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub taglines: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub genres: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub studios: Vec<StudioRef>,
    #[serde(deserialize_with = "nullable")]
    pub media_streams: Vec<MediaStream>,
    #[serde(deserialize_with = "nullable")]
    pub media_sources: Vec<MediaSourceRef>,
    pub user_data: Option<UserItemData>,
}

impl ItemDetails {
    pub fn item_id(&self) -> ItemId {
        ItemId::new(self.id.clone())
    }

    /// Runtime derived from server ticks
    pub fn runtime(&self) -> Option<Duration> {
        self.run_time_ticks
            .filter(|ticks| *ticks > 0)
            .map(|ticks| Duration::from_micros(ticks / 10))
    }

    pub fn is_episode(&self) -> bool {
        self.item_type.as_deref() == Some("Episode")
    }
}

/// Lightweight item reference (recommendation rail, now-playing)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemSummary {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "Type")]
    pub item_type: Option<String>,
    pub production_year: Option<i32>,
    pub community_rating: Option<f64>,
    pub run_time_ticks: Option<u64>,
}

/// Session play state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionPlayState {
    pub media_source_id: Option<String>,
    pub is_paused: bool,
    pub position_ticks: Option<u64>,
}

/// Active session entry from the session listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SessionInfo {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub now_playing_item: Option<ItemSummary>,
    pub play_state: Option<SessionPlayState>,
}

/// Playback lifecycle state of the bound media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing playing since the last bind or reset
    Idle,
    /// Media is playing
    Playing,
    /// Playback paused
    Paused,
    /// Playback ended
    Ended,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            (Idle, Playing) |
            (Playing, Paused) | (Playing, Ended) |
            (Paused, Playing) | (Paused, Idle) |
            (Ended, Idle)
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Why the smart auto-pause policy paused playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// No user input for the idle threshold
    Idle,
    /// Window lost focus for the blur threshold
    Blur,
    /// Document hidden for the hidden threshold
    Hidden,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PauseReason::Idle => write!(f, "idle"),
            PauseReason::Blur => write!(f, "blur"),
            PauseReason::Hidden => write!(f, "hidden"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_from_guid() {
        let hyphenated = ItemId::from_guid("6F1B0C6A-9E3D-4F4B-8E4A-1D2C3B4A5F60").unwrap();
        let simple = ItemId::from_guid("6f1b0c6a9e3d4f4b8e4a1d2c3b4a5f60").unwrap();
        assert_eq!(hyphenated, simple);
        assert_eq!(simple.as_str(), "6f1b0c6a9e3d4f4b8e4a1d2c3b4a5f60");
        assert!(ItemId::from_guid("stream.mp4").is_none());
    }

    #[test]
    fn test_item_details_tolerates_nulls() {
        let json = r#"{"Id":"abc","Name":"Heat","Tags":null,"Genres":["Crime"],"Studios":[{"Name":null}]}"#;
        let item: ItemDetails = serde_json::from_str(json).unwrap();
        assert!(item.tags.is_empty());
        assert_eq!(item.genres, vec!["Crime"]);
        assert_eq!(item.studios[0].name, "");
    }

    #[test]
    fn test_runtime_from_ticks() {
        let item = ItemDetails {
            run_time_ticks: Some(3600 * TICKS_PER_SECOND),
            ..Default::default()
        };
        assert_eq!(item.runtime(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_playback_state_transitions() {
        assert!(PlaybackState::Idle.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Paused.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Ended.can_transition_to(PlaybackState::Idle));
        assert!(!PlaybackState::Ended.can_transition_to(PlaybackState::Playing));
        assert!(!PlaybackState::Idle.can_transition_to(PlaybackState::Paused));
    }
}
