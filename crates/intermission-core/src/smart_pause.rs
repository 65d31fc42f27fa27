//! Smart auto-pause policy
//!
//! Pauses playback when nobody seems to be watching: no input for a while,
//! the window unfocused, or the document hidden. Runs on its own interval,
//! independent of the playback state machine.

use crate::{config::SmartPauseConfig, host::MediaElement, types::PauseReason};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Host activity shared by every binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySnapshot {
    pub last_input: Instant,
    pub blurred_since: Option<Instant>,
    pub hidden_since: Option<Instant>,
}

/// Tracks user input, window focus and document visibility
#[derive(Debug)]
pub struct ActivityTracker {
    state: Mutex<ActivitySnapshot>,
}

impl ActivityTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            state: Mutex::new(ActivitySnapshot {
                last_input: now,
                blurred_since: None,
                hidden_since: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActivitySnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn note_input(&self, now: Instant) {
        self.lock().last_input = now;
    }

    pub fn set_focused(&self, focused: bool, now: Instant) {
        let mut state = self.lock();
        if focused {
            state.blurred_since = None;
            state.last_input = now;
        } else if state.blurred_since.is_none() {
            state.blurred_since = Some(now);
        }
    }

    pub fn set_hidden(&self, hidden: bool, now: Instant) {
        let mut state = self.lock();
        if !hidden {
            state.hidden_since = None;
        } else if state.hidden_since.is_none() {
            state.hidden_since = Some(now);
        }
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        *self.lock()
    }
}

/// Why a check did not pause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Disabled,
    TooShort,
    NotPlaying,
    PictureInPicture,
    Grace,
    Cooldown(PauseReason),
    Watching,
}

/// Outcome of one policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Paused(PauseReason),
    Hold(Hold),
}

#[derive(Debug)]
struct PolicyState {
    bound_at: Instant,
    last_play: Option<Instant>,
    last_pause: Option<(PauseReason, Instant)>,
}

/// Per-binding auto-pause policy
#[derive(Debug)]
pub struct SmartPausePolicy {
    config: SmartPauseConfig,
    state: Mutex<PolicyState>,
}

impl SmartPausePolicy {
    pub fn new(config: SmartPauseConfig, bound_at: Instant) -> Self {
        Self {
            config,
            state: Mutex::new(PolicyState {
                bound_at,
                last_play: None,
                last_pause: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PolicyState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SmartPauseConfig {
        &self.config
    }

    /// Arm the post-resume guard
    pub fn note_play(&self, now: Instant) {
        self.lock().last_play = Some(now);
    }

    /// Most recent auto-pause and when it happened
    pub fn last_pause(&self) -> Option<(PauseReason, Instant)> {
        self.lock().last_pause
    }

    /// Evaluate every reason and pause `element` if one has been active long enough
    pub fn check(
        &self,
        element: &dyn MediaElement,
        activity: &ActivitySnapshot,
        now: Instant,
    ) -> PolicyDecision {
        let reason = match self.evaluate(element, activity, now) {
            Ok(reason) => reason,
            Err(hold) => return PolicyDecision::Hold(hold),
        };

        {
            let mut state = self.lock();
            if let Some((last, at)) = state.last_pause {
                if last == reason && now.saturating_duration_since(at) < self.config.repeat_cooldown() {
                    debug!(reason = %reason, "Auto-pause suppressed during cooldown");
                    return PolicyDecision::Hold(Hold::Cooldown(reason));
                }
            }
            state.last_pause = Some((reason, now));
        }

        info!(reason = %reason, element = %element.id(), "Smart pause");
        element.pause();
        PolicyDecision::Paused(reason)
    }

    fn evaluate(
        &self,
        element: &dyn MediaElement,
        activity: &ActivitySnapshot,
        now: Instant,
    ) -> Result<PauseReason, Hold> {
        let config = &self.config;
        if !config.smart_pause_enabled {
            return Err(Hold::Disabled);
        }
        if let Some(duration) = element.duration() {
            if duration.is_finite() && duration < config.min_video_duration().as_secs_f64() {
                return Err(Hold::TooShort);
            }
        }
        if element.is_paused() || element.is_ended() {
            return Err(Hold::NotPlaying);
        }
        if config.respect_pip && element.is_picture_in_picture() {
            return Err(Hold::PictureInPicture);
        }

        let (bound_at, last_play) = {
            let state = self.lock();
            (state.bound_at, state.last_play)
        };
        let since_bind = now.saturating_duration_since(bound_at);
        let since_play = last_play.map(|at| now.saturating_duration_since(at));
        if since_bind < config.monitor_after()
            || since_play.is_some_and(|elapsed| elapsed < config.post_resume_guard())
        {
            return Err(Hold::Grace);
        }

        let exceeded = |since: Option<Instant>, threshold: Option<Duration>| match (since, threshold) {
            (Some(since), Some(threshold)) => now.saturating_duration_since(since) >= threshold,
            _ => false,
        };
        let idle_since = activity.last_input.max(bound_at);

        if exceeded(activity.hidden_since, config.hidden_threshold()) {
            Ok(PauseReason::Hidden)
        } else if exceeded(activity.blurred_since, config.blur_threshold()) {
            Ok(PauseReason::Blur)
        } else if exceeded(Some(idle_since), config.idle_threshold()) {
            Ok(PauseReason::Idle)
        } else {
            Err(Hold::Watching)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ListenerId, MediaEvent, MediaListener};
    use crate::types::ElementId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Player {
        paused: AtomicBool,
        pauses: AtomicUsize,
        pip: bool,
        duration: Option<f64>,
    }

    impl Player {
        fn playing(duration: Option<f64>) -> Self {
            Self {
                paused: AtomicBool::new(false),
                pauses: AtomicUsize::new(0),
                pip: false,
                duration,
            }
        }
    }

    impl MediaElement for Player {
        fn id(&self) -> ElementId {
            ElementId(1)
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }
        fn is_ended(&self) -> bool {
            false
        }
        fn current_time(&self) -> f64 {
            0.0
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
        fn is_muted(&self) -> bool {
            false
        }
        fn is_autoplay(&self) -> bool {
            false
        }
        fn current_src(&self) -> Option<String> {
            None
        }
        fn is_picture_in_picture(&self) -> bool {
            self.pip
        }
        fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
        fn play(&self) {
            self.paused.store(false, Ordering::SeqCst);
        }
        fn add_listener(&self, _event: MediaEvent, _listener: MediaListener) -> ListenerId {
            ListenerId(0)
        }
        fn remove_listener(&self, _id: ListenerId) {}
    }

    fn config() -> SmartPauseConfig {
        SmartPauseConfig {
            idle_minutes: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_activity_tracker() {
        let start = Instant::now();
        let tracker = ActivityTracker::new(start);
        tracker.set_focused(false, start);
        tracker.set_focused(false, start + Duration::from_secs(5));
        assert_eq!(tracker.snapshot().blurred_since, Some(start));

        tracker.set_hidden(true, start);
        tracker.set_hidden(false, start);
        assert_eq!(tracker.snapshot().hidden_since, None);
    }

    #[test]
    fn test_idle_pause_then_cooldown() {
        let start = Instant::now();
        let policy = SmartPausePolicy::new(config(), start);
        let player = Player::playing(Some(3600.0));
        let activity = ActivityTracker::new(start).snapshot();

        let early = start + Duration::from_secs(30);
        assert_eq!(policy.check(&player, &activity, early), PolicyDecision::Hold(Hold::Watching));

        let late = start + Duration::from_secs(61);
        assert_eq!(policy.check(&player, &activity, late), PolicyDecision::Paused(PauseReason::Idle));
        assert_eq!(player.pauses.load(Ordering::SeqCst), 1);

        player.play();
        let retry = late + Duration::from_secs(2);
        assert_eq!(
            policy.check(&player, &activity, retry),
            PolicyDecision::Hold(Hold::Cooldown(PauseReason::Idle))
        );
        assert_eq!(player.pauses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_grace_periods() {
        let start = Instant::now();
        let policy = SmartPausePolicy::new(config(), start);
        let player = Player::playing(None);
        let activity = ActivityTracker::new(start).snapshot();

        let soon = start + Duration::from_secs(5);
        assert_eq!(policy.check(&player, &activity, soon), PolicyDecision::Hold(Hold::Grace));

        let resumed = start + Duration::from_secs(120);
        policy.note_play(resumed);
        assert_eq!(
            policy.check(&player, &activity, resumed + Duration::from_secs(1)),
            PolicyDecision::Hold(Hold::Grace)
        );
    }

    #[test]
    fn test_hidden_beats_idle() {
        let start = Instant::now();
        let policy = SmartPausePolicy::new(config(), start);
        let player = Player::playing(Some(3600.0));
        let tracker = ActivityTracker::new(start);
        tracker.set_hidden(true, start + Duration::from_secs(10));

        let now = start + Duration::from_secs(180);
        assert_eq!(
            policy.check(&player, &tracker.snapshot(), now),
            PolicyDecision::Paused(PauseReason::Hidden)
        );
    }

    #[test]
    fn test_exemptions() {
        let start = Instant::now();
        let now = start + Duration::from_secs(3600);
        let activity = ActivityTracker::new(start).snapshot();

        let short = Player::playing(Some(120.0));
        let policy = SmartPausePolicy::new(config(), start);
        assert_eq!(policy.check(&short, &activity, now), PolicyDecision::Hold(Hold::TooShort));

        let pip = Player {
            pip: true,
            ..Player::playing(Some(3600.0))
        };
        assert_eq!(
            policy.check(&pip, &activity, now),
            PolicyDecision::Hold(Hold::PictureInPicture)
        );

        let disabled = SmartPausePolicy::new(
            SmartPauseConfig {
                smart_pause_enabled: false,
                ..config()
            },
            start,
        );
        assert_eq!(
            disabled.check(&short, &activity, now),
            PolicyDecision::Hold(Hold::Disabled)
        );
    }
}
