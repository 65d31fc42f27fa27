//! Playback state machine
//!
//! One machine per binding. It reacts to the bound element's events, drives
//! the badge and the pause overlay, and owns the binding's smart-pause policy.
//!
//! Every async path is guarded by sequence counters checked before any state
//! is applied:
//! - the binding scope must not be cancelled and its generation must still be
//!   the active one,
//! - badge work carries the play-start `epoch`,
//! - overlay work carries the `pause_seq` of the pause that requested it.

use crate::{
    host::{MediaEvent, SharedElement},
    monitor::MonitorContext,
    overlay::{BadgeContent, OverlayContent},
    scope::{ResourceScope, TimerId},
    smart_pause::{PolicyDecision, SmartPausePolicy},
    types::*,
    Error, Result,
};
use chrono::Local;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Per-binding session state
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub state: PlaybackState,
    /// Resolved lazily; `None` while unknown
    pub item_id: Option<ItemId>,
    pub play_started: Option<Instant>,
    pub badge_shown_at: Option<Instant>,
    /// Incremented on every `play`
    pub epoch: u64,
    /// Incremented by every event that supersedes a pending overlay
    pub pause_seq: u64,
    pub overlay_visible: bool,
    /// Playback position seen by the last event or badge tick
    pub last_position: f64,
    badge_poll: Option<TimerId>,
    badge_pending: bool,
    badge_done: bool,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            item_id: None,
            play_started: None,
            badge_shown_at: None,
            epoch: 0,
            pause_seq: 0,
            overlay_visible: false,
            last_position: 0.0,
            badge_poll: None,
            badge_pending: false,
            badge_done: false,
        }
    }
}

enum BadgeStep {
    Stop,
    Wait,
    Compute(Option<Instant>),
}

/// State machine attached to one bound element
pub struct PlaybackMachine {
    ctx: Arc<MonitorContext>,
    element: SharedElement,
    element_id: ElementId,
    scope: ResourceScope,
    generation: u64,
    policy: SmartPausePolicy,
    session: Mutex<PlaybackSession>,
    weak: Weak<PlaybackMachine>,
}

impl PlaybackMachine {
    pub fn new(
        ctx: Arc<MonitorContext>,
        element: SharedElement,
        scope: ResourceScope,
        generation: u64,
    ) -> Arc<Self> {
        let element_id = element.id();
        let policy = SmartPausePolicy::new(ctx.config.smart_pause.clone(), Instant::now());
        Arc::new_cyclic(|weak| Self {
            ctx,
            element,
            element_id,
            scope,
            generation,
            policy,
            session: Mutex::new(PlaybackSession::default()),
            weak: weak.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackSession> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn element(&self) -> &SharedElement {
        &self.element
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub fn policy(&self) -> &SmartPausePolicy {
        &self.policy
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn session(&self) -> PlaybackSession {
        self.lock().clone()
    }

    /// Still the active binding of a live monitor
    pub fn is_current(&self) -> bool {
        !self.scope.is_cancelled()
            && self.ctx.active_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Catch up with an element that was already playing when bound
    pub fn start(&self) {
        if !self.element.is_paused() && !self.element.is_ended() {
            self.handle_event(MediaEvent::Play);
        }
    }

    pub fn handle_event(&self, event: MediaEvent) {
        if !self.is_current() {
            return;
        }
        debug!(event = %event, element = %self.element_id, "Media event");
        match event {
            MediaEvent::Play => self.on_play(),
            MediaEvent::Pause => self.on_pause(),
            MediaEvent::Seeking => self.on_seeking(),
            MediaEvent::LoadedMetadata => self.on_loaded_metadata(),
            terminal if terminal.is_terminal() => self.on_terminal(terminal),
            _ => {}
        }
    }

    /// Run one smart-pause check against the bound element
    pub fn check_policy(&self) -> PolicyDecision {
        let activity = self.ctx.activity.snapshot();
        self.policy.check(self.element.as_ref(), &activity, Instant::now())
    }

    /// Hide the overlay and cancel a pending one; optionally resume playback.
    /// Returns whether an overlay was visible.
    pub fn dismiss_overlay(&self, resume: bool) -> bool {
        let was_visible = {
            let mut session = self.lock();
            session.pause_seq += 1;
            std::mem::take(&mut session.overlay_visible)
        };
        if was_visible {
            self.ctx.surface.hide_overlay();
            if resume {
                debug!(element = %self.element_id, "Overlay dismissed; resuming playback");
                self.element.play();
            }
        }
        was_visible
    }

    /// Tear down: clear visible UI and cancel the binding scope
    pub fn shutdown(&self) {
        let (overlay, badge) = {
            let mut session = self.lock();
            session.epoch += 1;
            session.pause_seq += 1;
            session.badge_poll = None;
            (
                std::mem::take(&mut session.overlay_visible),
                session.badge_shown_at.take().is_some(),
            )
        };
        if overlay {
            self.ctx.surface.hide_overlay();
        }
        if badge {
            self.ctx.surface.hide_badge();
        }
        self.scope.cancel_all();
    }

    fn transition(&self, session: &mut PlaybackSession, target: PlaybackState) -> Result<()> {
        if !session.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: session.state.to_string(),
                to: target.to_string(),
            });
        }
        info!(
            element = %self.element_id,
            from = %session.state,
            to = %target,
            "Playback state changed"
        );
        session.state = target;
        Ok(())
    }

    fn passes_duration_gate(&self) -> bool {
        match self.element.duration() {
            Some(duration) if duration.is_finite() => {
                duration >= self.ctx.config.min_video_duration().as_secs_f64()
            }
            _ => true,
        }
    }

    fn on_play(&self) {
        let now = Instant::now();
        let position = self.element.current_time();
        let lock_window = self.ctx.config.badge_lock();

        let (epoch, hide_overlay, hide_badge, stale_poll) = {
            let mut session = self.lock();
            if session.state == PlaybackState::Playing {
                return;
            }
            if session.state == PlaybackState::Ended {
                let _ = self.transition(&mut session, PlaybackState::Idle);
            }
            if let Err(err) = self.transition(&mut session, PlaybackState::Playing) {
                debug!(error = %err, "Ignoring play");
                return;
            }
            session.epoch += 1;
            session.pause_seq += 1;
            session.play_started = Some(now);
            session.item_id = None;
            session.last_position = position;
            session.badge_pending = false;
            session.badge_done = false;

            let hide_badge = session
                .badge_shown_at
                .is_some_and(|shown| now.saturating_duration_since(shown) >= lock_window);
            if hide_badge {
                session.badge_shown_at = None;
            }
            (
                session.epoch,
                std::mem::take(&mut session.overlay_visible),
                hide_badge,
                session.badge_poll.take(),
            )
        };

        if let Some(timer) = stale_poll {
            self.scope.clear(timer);
        }
        if hide_overlay {
            self.ctx.surface.hide_overlay();
        }
        if hide_badge {
            self.ctx.surface.hide_badge();
        }
        self.policy.note_play(now);
        if self.ctx.config.badge_enabled {
            self.start_badge_poll(epoch);
        }
    }

    fn on_pause(&self) {
        if self.element.is_ended() {
            return;
        }
        let position = self.element.current_time();
        let gate = self.passes_duration_gate();

        let (seq, stale_poll) = {
            let mut session = self.lock();
            if let Err(err) = self.transition(&mut session, PlaybackState::Paused) {
                debug!(error = %err, "Ignoring pause");
                return;
            }
            session.pause_seq += 1;
            session.last_position = position;
            (session.pause_seq, session.badge_poll.take())
        };
        if let Some(timer) = stale_poll {
            self.scope.clear(timer);
        }

        if !self.ctx.config.pause_overlay_enabled || !gate {
            return;
        }
        let weak = self.weak.clone();
        self.scope.add_timeout(self.ctx.config.pause_debounce(), move || {
            if let Some(machine) = weak.upgrade() {
                machine.begin_overlay(seq);
            }
        });
    }

    fn on_seeking(&self) {
        let now = Instant::now();
        let position = self.element.current_time();
        let threshold = self.ctx.config.seek_hide_threshold_secs;
        let lock_window = self.ctx.config.badge_lock();

        let hide = {
            let mut session = self.lock();
            let jump = (position - session.last_position).abs();
            session.last_position = position;
            if jump <= threshold {
                false
            } else {
                match session.badge_shown_at {
                    Some(shown) if now.saturating_duration_since(shown) >= lock_window => {
                        session.badge_shown_at = None;
                        true
                    }
                    _ => false,
                }
            }
        };
        if hide {
            debug!(element = %self.element_id, "Seek hid the badge");
            self.ctx.surface.hide_badge();
        }
    }

    fn on_loaded_metadata(&self) {
        let now = Instant::now();
        let position = self.element.current_time();
        let (restart, hide_overlay, stale_poll) = {
            let mut session = self.lock();
            session.item_id = None;
            session.epoch += 1;
            session.pause_seq += 1;
            session.last_position = position;
            session.badge_pending = false;
            session.badge_done = false;
            let playing = session.state == PlaybackState::Playing;
            if playing {
                session.play_started = Some(now);
            }
            (
                playing.then_some(session.epoch),
                std::mem::take(&mut session.overlay_visible),
                session.badge_poll.take(),
            )
        };
        if let Some(timer) = stale_poll {
            self.scope.clear(timer);
        }
        if hide_overlay {
            self.ctx.surface.hide_overlay();
        }
        if let Some(epoch) = restart.filter(|_| self.ctx.config.badge_enabled) {
            self.start_badge_poll(epoch);
        }
    }

    fn on_terminal(&self, event: MediaEvent) {
        let (hide_overlay, hide_badge, stale_poll) = {
            let mut session = self.lock();
            let target = match session.state {
                PlaybackState::Playing => Some(PlaybackState::Ended),
                PlaybackState::Paused => Some(PlaybackState::Idle),
                _ => None,
            };
            if let Some(target) = target {
                let _ = self.transition(&mut session, target);
            }
            session.epoch += 1;
            session.pause_seq += 1;
            session.item_id = None;
            session.play_started = None;
            session.badge_pending = false;
            session.badge_done = false;
            (
                std::mem::take(&mut session.overlay_visible),
                session.badge_shown_at.take().is_some(),
                session.badge_poll.take(),
            )
        };
        debug!(event = %event, element = %self.element_id, "Session reset");
        if let Some(timer) = stale_poll {
            self.scope.clear(timer);
        }
        if hide_overlay {
            self.ctx.surface.hide_overlay();
        }
        if hide_badge {
            self.ctx.surface.hide_badge();
        }
    }

    // ===== Badge =====

    fn start_badge_poll(&self, epoch: u64) {
        let weak = self.weak.clone();
        let timer = self.scope.add_interval(self.ctx.config.badge_poll(), move || {
            if let Some(machine) = weak.upgrade() {
                machine.badge_tick(epoch);
            }
        });
        let Some(timer) = timer else {
            return;
        };
        let orphan = {
            let mut session = self.lock();
            if session.epoch == epoch {
                session.badge_poll.replace(timer)
            } else {
                Some(timer)
            }
        };
        if let Some(orphan) = orphan {
            self.scope.clear(orphan);
        }
    }

    fn stop_badge_poll(&self, epoch: u64) {
        let timer = {
            let mut session = self.lock();
            if session.epoch != epoch {
                return;
            }
            session.badge_poll.take()
        };
        if let Some(timer) = timer {
            self.scope.clear(timer);
        }
    }

    fn badge_tick(&self, epoch: u64) {
        let now = Instant::now();
        let position = self.element.current_time();
        let duration_ok = self.passes_duration_gate();
        let config = &self.ctx.config;

        let step = {
            let mut session = self.lock();
            if !self.is_current() || session.epoch != epoch || session.state != PlaybackState::Playing {
                BadgeStep::Stop
            } else {
                session.last_position = position;
                let elapsed = session
                    .play_started
                    .map(|started| now.saturating_duration_since(started))
                    .unwrap_or_default();
                if session.badge_done {
                    BadgeStep::Stop
                } else if elapsed > config.badge_window() {
                    debug!(element = %self.element_id, "Badge window elapsed");
                    session.badge_done = true;
                    BadgeStep::Stop
                } else if session.badge_pending || position < config.badge_min_playback_secs {
                    BadgeStep::Wait
                } else if !duration_ok {
                    session.badge_done = true;
                    BadgeStep::Stop
                } else {
                    session.badge_pending = true;
                    BadgeStep::Compute(session.play_started)
                }
            }
        };

        match step {
            BadgeStep::Stop => self.stop_badge_poll(epoch),
            BadgeStep::Wait => {}
            BadgeStep::Compute(started) => {
                if let Some(machine) = self.weak.upgrade() {
                    self.scope.spawn(machine.compute_badge(epoch, started));
                }
            }
        }
    }

    fn badge_epoch_current(&self, session: &PlaybackSession, epoch: u64) -> bool {
        self.is_current() && session.epoch == epoch && session.state == PlaybackState::Playing
    }

    fn badge_still_current(&self, epoch: u64) -> bool {
        let session = self.lock();
        self.badge_epoch_current(&session, epoch)
    }

    async fn compute_badge(self: Arc<Self>, epoch: u64, started: Option<Instant>) {
        let ctx = self.ctx.clone();
        let details = match ctx.identity.resolve(self.element.as_ref(), started).await {
            Some(identity) => ctx.identity.details(&identity).await,
            None => None,
        };
        let Some(details) = details else {
            let mut session = self.lock();
            if session.epoch == epoch {
                session.badge_pending = false;
            }
            return;
        };
        if !self.badge_still_current(epoch) {
            return;
        }

        let classification = ctx
            .descriptors
            .classify(ctx.metadata.service().as_ref(), &details)
            .await;
        let badge = BadgeContent::from_classification(details.item_id(), &classification);

        let now = Instant::now();
        let show = {
            let mut session = self.lock();
            if !self.badge_epoch_current(&session, epoch) {
                return;
            }
            session.badge_pending = false;
            session.badge_done = true;
            session.item_id = Some(details.item_id());
            let locked = session
                .badge_shown_at
                .is_some_and(|shown| now.saturating_duration_since(shown) < ctx.config.badge_lock());
            match badge {
                Some(badge) if !locked => {
                    session.badge_shown_at = Some(now);
                    Some(badge)
                }
                _ => None,
            }
        };
        self.stop_badge_poll(epoch);

        if let Some(badge) = show {
            info!(item_id = %details.id, line = %badge.line(), "Badge shown");
            ctx.surface.show_badge(badge);
            let weak = self.weak.clone();
            self.scope.add_timeout(ctx.config.badge_display(), move || {
                if let Some(machine) = weak.upgrade() {
                    machine.expire_badge(now);
                }
            });
        }
    }

    fn expire_badge(&self, shown_at: Instant) {
        let expired = {
            let mut session = self.lock();
            if session.badge_shown_at == Some(shown_at) {
                session.badge_shown_at = None;
                true
            } else {
                false
            }
        };
        if expired {
            self.ctx.surface.hide_badge();
        }
    }

    // ===== Overlay =====

    fn pause_current(&self, session: &PlaybackSession, seq: u64) -> bool {
        self.is_current() && session.pause_seq == seq && session.state == PlaybackState::Paused
    }

    fn overlay_still_current(&self, seq: u64) -> bool {
        let session = self.lock();
        self.pause_current(&session, seq)
    }

    fn begin_overlay(&self, seq: u64) {
        if !self.overlay_still_current(seq) {
            return;
        }
        if let Some(machine) = self.weak.upgrade() {
            self.scope.spawn(machine.show_overlay(seq));
        }
    }

    async fn show_overlay(self: Arc<Self>, seq: u64) {
        let ctx = self.ctx.clone();
        let started = self.lock().play_started;

        let Some(identity) = ctx.identity.resolve(self.element.as_ref(), started).await else {
            debug!(element = %self.element_id, "No item identity; overlay skipped");
            return;
        };
        if !self.overlay_still_current(seq) {
            return;
        }
        let Some(details) = ctx.identity.details(&identity).await else {
            return;
        };
        if !self.overlay_still_current(seq) {
            return;
        }

        let classification = ctx
            .descriptors
            .classify(ctx.metadata.service().as_ref(), &details)
            .await;
        let recommendations = if ctx.config.recommendation_count > 0 {
            ctx.metadata
                .similar_items(&details.item_id(), ctx.config.recommendation_count)
                .await
        } else {
            Arc::new(Vec::new())
        };

        let remaining = self
            .element
            .duration()
            .map(|duration| duration - self.element.current_time())
            .filter(|left| left.is_finite() && *left > 0.0)
            .map(Duration::from_secs_f64);
        let content = OverlayContent::build(
            &details,
            &classification,
            &recommendations,
            remaining,
            Local::now(),
            ctx.descriptors.labels(),
        );

        if !self.element.is_paused() {
            return;
        }
        {
            let mut session = self.lock();
            if !self.pause_current(&session, seq) {
                return;
            }
            session.overlay_visible = true;
            session.item_id = Some(details.item_id());
        }
        info!(
            item_id = %details.id,
            descriptors = %content.descriptor_line(),
            "Pause overlay shown"
        );
        ctx.surface.show_overlay(content);
    }
}
