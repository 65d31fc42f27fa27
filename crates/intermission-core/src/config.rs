//! Monitor configuration and localized labels
//!
//! The host supplies one flat JSON options object. Every numeric threshold
//! used by the playback state machine and the smart auto-pause policy lives
//! here with a default, so an empty object `{}` is a valid configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Flat options object consumed by [`crate::setup`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Show the advisory overlay while paused
    pub pause_overlay_enabled: bool,
    /// Show the rating/descriptor badge shortly after playback begins
    pub badge_enabled: bool,
    /// Items shorter than this never get the overlay or badge
    pub min_video_minutes: f64,
    /// Debounce between a pause event and showing the overlay
    pub pause_debounce_ms: u64,
    /// Delay of the first badge evaluation after `play`, and the poll period after it
    pub badge_poll_ms: u64,
    /// Playback time required before the badge is computed
    pub badge_min_playback_secs: f64,
    /// Badge attempts are abandoned this long after `play`
    pub badge_window_ms: u64,
    /// A shown badge cannot be hidden by low-severity events for this long
    pub badge_lock_ms: u64,
    /// A shown badge hides itself after this long
    pub badge_display_ms: u64,
    /// Seeks shorter than this keep the badge
    pub seek_hide_threshold_secs: f64,
    /// Now-playing signal must be stable this long before it is trusted
    pub now_playing_debounce_ms: u64,
    /// Window after `play` during which older now-playing signals are ignored
    pub fresh_play_guard_ms: u64,
    /// Nested-document depth for discovery
    pub discovery_max_depth: usize,
    /// Fallback polling attempts when the change-observer stays silent
    pub discovery_poll_attempts: u32,
    /// First fallback polling delay; later attempts back off from it
    pub discovery_poll_base_ms: u64,
    /// TTL of cached item details
    pub item_cache_ttl_ms: u64,
    /// TTL of the catalog-derived descriptor vocabulary
    pub vocabulary_ttl_ms: u64,
    /// Maximum entries in the overlay recommendation rail
    pub recommendation_count: usize,
    /// This client's device id, used for same-session lookups
    pub device_id: Option<String>,
    /// Pre-supplied descriptor vocabulary (bucket -> tags); skips the catalog fetch
    pub descriptor_vocabulary: Option<BTreeMap<String, Vec<String>>>,
    /// Bucket tie-break order; unknown keys are ignored, missing keys keep their default order after the listed ones
    pub descriptor_priority: Option<Vec<String>>,
    /// Score removed per negative token when matching tags, genres and text
    pub descriptor_negative_penalty: f64,
    /// Smart auto-pause thresholds
    #[serde(flatten)]
    pub smart_pause: SmartPauseConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pause_overlay_enabled: true,
            badge_enabled: true,
            min_video_minutes: 5.0,
            pause_debounce_ms: 1200,
            badge_poll_ms: 800,
            badge_min_playback_secs: 2.0,
            badge_window_ms: 45_000,
            badge_lock_ms: 2500,
            badge_display_ms: 6000,
            seek_hide_threshold_secs: 3.0,
            now_playing_debounce_ms: 300,
            fresh_play_guard_ms: 1500,
            discovery_max_depth: 3,
            discovery_poll_attempts: 10,
            discovery_poll_base_ms: 300,
            item_cache_ttl_ms: 5 * 60 * 1000,
            vocabulary_ttl_ms: 6 * 60 * 60 * 1000,
            recommendation_count: 6,
            device_id: None,
            descriptor_vocabulary: None,
            descriptor_priority: None,
            descriptor_negative_penalty: 1.5,
            smart_pause: SmartPauseConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse the host's JSON options blob
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make the state machine misbehave
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = [
            ("minVideoMinutes", self.min_video_minutes),
            ("badgeMinPlaybackSecs", self.badge_min_playback_secs),
            ("seekHideThresholdSecs", self.seek_hide_threshold_secs),
            ("descriptorNegativePenalty", self.descriptor_negative_penalty),
            ("idleMinutes", self.smart_pause.idle_minutes),
            ("blurMinutes", self.smart_pause.blur_minutes),
            ("hiddenMinutes", self.smart_pause.hidden_minutes),
            ("smartPauseMinVideoMinutes", self.smart_pause.smart_pause_min_video_minutes),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a non-negative number")));
            }
        }
        if self.badge_poll_ms == 0 {
            return Err(Error::InvalidConfig("badgePollMs must be positive".into()));
        }
        if self.smart_pause.check_interval_ms == 0 {
            return Err(Error::InvalidConfig("checkIntervalMs must be positive".into()));
        }
        if self.badge_window_ms < self.badge_poll_ms {
            return Err(Error::InvalidConfig(
                "badgeWindowMs must be at least one badge poll period".into(),
            ));
        }
        Ok(())
    }

    pub fn min_video_duration(&self) -> Duration {
        minutes(self.min_video_minutes).unwrap_or_default()
    }

    pub fn pause_debounce(&self) -> Duration {
        Duration::from_millis(self.pause_debounce_ms)
    }

    pub fn badge_poll(&self) -> Duration {
        Duration::from_millis(self.badge_poll_ms)
    }

    pub fn badge_window(&self) -> Duration {
        Duration::from_millis(self.badge_window_ms)
    }

    pub fn badge_lock(&self) -> Duration {
        Duration::from_millis(self.badge_lock_ms)
    }

    pub fn badge_display(&self) -> Duration {
        Duration::from_millis(self.badge_display_ms)
    }

    pub fn item_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.item_cache_ttl_ms)
    }

    pub fn vocabulary_ttl(&self) -> Duration {
        Duration::from_millis(self.vocabulary_ttl_ms)
    }
}

/// Smart auto-pause thresholds, immutable for the lifetime of one binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartPauseConfig {
    pub smart_pause_enabled: bool,
    /// Pause after this long without user input (0 disables)
    pub idle_minutes: f64,
    /// Pause after the window has been unfocused this long (0 disables)
    pub blur_minutes: f64,
    /// Pause after the document has been hidden this long (0 disables)
    pub hidden_minutes: f64,
    /// Grace period after bind before any reason may fire
    pub monitor_after_ms: u64,
    /// Grace period after every `play`
    pub post_resume_guard_ms: u64,
    /// Items shorter than this are never auto-paused
    pub smart_pause_min_video_minutes: f64,
    /// Picture-in-Picture playback is exempt
    pub respect_pip: bool,
    /// Period of the policy check
    pub check_interval_ms: u64,
    /// Suppress repeated pauses for the same reason within this window
    pub repeat_cooldown_ms: u64,
}

impl Default for SmartPauseConfig {
    fn default() -> Self {
        Self {
            smart_pause_enabled: true,
            idle_minutes: 45.0,
            blur_minutes: 0.0,
            hidden_minutes: 2.0,
            monitor_after_ms: 10_000,
            post_resume_guard_ms: 5000,
            smart_pause_min_video_minutes: 10.0,
            respect_pip: true,
            check_interval_ms: 1000,
            repeat_cooldown_ms: 3000,
        }
    }
}

impl SmartPauseConfig {
    pub fn idle_threshold(&self) -> Option<Duration> {
        minutes(self.idle_minutes)
    }

    pub fn blur_threshold(&self) -> Option<Duration> {
        minutes(self.blur_minutes)
    }

    pub fn hidden_threshold(&self) -> Option<Duration> {
        minutes(self.hidden_minutes)
    }

    pub fn monitor_after(&self) -> Duration {
        Duration::from_millis(self.monitor_after_ms)
    }

    pub fn post_resume_guard(&self) -> Duration {
        Duration::from_millis(self.post_resume_guard_ms)
    }

    pub fn min_video_duration(&self) -> Duration {
        minutes(self.smart_pause_min_video_minutes).unwrap_or_default()
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn repeat_cooldown(&self) -> Duration {
        Duration::from_millis(self.repeat_cooldown_ms)
    }
}

/// Positive minute counts as a duration; zero or invalid means "disabled"
fn minutes(value: f64) -> Option<Duration> {
    (value.is_finite() && value > 0.0).then(|| Duration::from_secs_f64(value * 60.0))
}

/// Localized label dictionary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(HashMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a label, falling back to the literal when missing or blank
    pub fn get(&self, key: &str, fallback: &str) -> String {
        match self.0.get(key) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl FromIterator<(String, String)> for Labels {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.pause_debounce_ms, 1200);
        assert_eq!(config.badge_window_ms, 45_000);
        assert_eq!(config.vocabulary_ttl(), Duration::from_secs(6 * 3600));
        assert_eq!(config.smart_pause.repeat_cooldown(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_flat_json() {
        let json = r#"{
            "pauseDebounceMs": 900,
            "idleMinutes": 1,
            "blurMinutes": 0,
            "respectPip": false,
            "descriptorVocabulary": {"heist": ["bank robbery"]}
        }"#;
        let config = MonitorConfig::from_json(json).unwrap();
        assert_eq!(config.pause_debounce_ms, 900);
        assert_eq!(config.smart_pause.idle_threshold(), Some(Duration::from_secs(60)));
        assert_eq!(config.smart_pause.blur_threshold(), None);
        assert!(!config.smart_pause.respect_pip);
        assert_eq!(config.badge_lock_ms, 2500);
        assert!(config.descriptor_vocabulary.is_some());
        assert_eq!(config.descriptor_negative_penalty, 1.5);
    }

    #[test]
    fn test_config_negative_penalty() {
        let config = MonitorConfig::from_json(r#"{"descriptorNegativePenalty": 0.5}"#).unwrap();
        assert_eq!(config.descriptor_negative_penalty, 0.5);

        let err = MonitorConfig::from_json(r#"{"descriptorNegativePenalty": -1}"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_config_rejects_negative_threshold() {
        let err = MonitorConfig::from_json(r#"{"idleMinutes": -3}"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_labels_fallback() {
        let labels = Labels::from_json(r#"{"noRating": "Derecelendirilmemiş", "blank": " "}"#).unwrap();
        assert_eq!(labels.get("noRating", "Not rated"), "Derecelendirilmemiş");
        assert_eq!(labels.get("blank", "Fallback"), "Fallback");
        assert_eq!(labels.get("missing", "Missing"), "Missing");
    }
}
