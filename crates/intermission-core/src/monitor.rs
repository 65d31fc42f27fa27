//! Monitor lifecycle
//!
//! [`setup`] wires the host capabilities into a running monitor and returns
//! the [`Monitor`] handle; [`Monitor::destroy`] undoes everything through the
//! root [`ResourceScope`]. [`MonitorSlot`] keeps the "one active instance"
//! rule for hosts that re-run their init path.

use crate::{
    binding::{Binder, Discovery},
    cache::MetadataCache,
    classifier::DescriptorEngine,
    config::{Labels, MonitorConfig},
    host::{Host, HostEvent, OverlaySurface, SharedElement},
    identity::IdentityResolver,
    playback::PlaybackMachine,
    scope::ResourceScope,
    smart_pause::ActivityTracker,
    types::*,
    Error, Result,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// Everything a binding needs, shared by all bindings of one monitor
pub struct MonitorContext {
    pub config: MonitorConfig,
    pub surface: Arc<dyn OverlaySurface>,
    pub metadata: Arc<MetadataCache>,
    pub descriptors: DescriptorEngine,
    pub identity: IdentityResolver,
    pub activity: ActivityTracker,
    /// Generation of the active binding
    pub active_generation: AtomicU64,
}

struct MonitorInner {
    scope: ResourceScope,
    ctx: Arc<MonitorContext>,
    binder: Arc<Binder>,
    destroyed: AtomicBool,
}

/// Handle to a running monitor
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

/// Start monitoring. Must be called inside a tokio runtime.
pub fn setup(host: Host, config: MonitorConfig, labels: Labels) -> Result<Monitor> {
    config.validate()?;
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(Error::Internal("setup requires a tokio runtime".into()));
    }

    let scope = ResourceScope::new();
    let metadata = Arc::new(MetadataCache::new(host.metadata.clone(), config.item_cache_ttl()));
    let identity = IdentityResolver::new(
        metadata.clone(),
        host.now_playing.clone(),
        config.device_id.clone(),
        std::time::Duration::from_millis(config.now_playing_debounce_ms),
        std::time::Duration::from_millis(config.fresh_play_guard_ms),
    );
    let ctx = Arc::new(MonitorContext {
        descriptors: DescriptorEngine::new(&config, labels),
        surface: host.surface.clone(),
        metadata,
        identity,
        activity: ActivityTracker::new(Instant::now()),
        active_generation: AtomicU64::new(0),
        config,
    });
    let discovery = Discovery::new(
        host.candidates.clone(),
        host.preview.clone(),
        ctx.config.discovery_max_depth,
    );
    let binder = Binder::new(ctx.clone(), scope.clone(), discovery);

    let monitor = Monitor {
        inner: Arc::new(MonitorInner {
            scope,
            ctx,
            binder,
            destroyed: AtomicBool::new(false),
        }),
    };
    monitor.inner.binder.start_watching();
    info!(scope = %monitor.inner.ctx.metadata.scope_stamp(), "Intermission monitor started");
    Ok(monitor)
}

impl Monitor {
    /// Tear everything down. Safe to call any number of times.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            debug!("Monitor already destroyed");
            return;
        }
        self.inner.binder.unbind();
        self.inner.scope.cancel_all();
        self.inner.ctx.metadata.clear();
        self.inner.ctx.descriptors.clear();
        info!("Intermission monitor destroyed");
    }

    pub fn is_active(&self) -> bool {
        !self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.ctx.config
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.inner.scope
    }

    /// Forward a host lifecycle notification
    pub fn handle_host_event(&self, event: HostEvent) {
        if !self.is_active() {
            return;
        }
        let now = Instant::now();
        let activity = &self.inner.ctx.activity;
        let machine = self.inner.binder.active_machine();

        match event {
            HostEvent::UserInput => activity.note_input(now),
            HostEvent::FocusChanged { focused } => activity.set_focused(focused, now),
            HostEvent::VisibilityChanged { hidden } => {
                activity.set_hidden(hidden, now);
                if hidden {
                    if let Some(machine) = machine {
                        machine.dismiss_overlay(false);
                    }
                }
            }
            HostEvent::EscapePressed => {
                activity.note_input(now);
                if let Some(machine) = machine {
                    machine.dismiss_overlay(false);
                }
            }
            HostEvent::Navigated => {
                if let Some(machine) = machine {
                    machine.dismiss_overlay(false);
                }
                self.inner.ctx.metadata.invalidate_scope();
                self.inner.binder.rescan();
            }
            HostEvent::OverlayClicked { inside_rail } => {
                activity.note_input(now);
                if !inside_rail {
                    if let Some(machine) = machine {
                        machine.dismiss_overlay(true);
                    }
                }
            }
        }
    }

    /// Bind a specific element, bypassing discovery
    pub fn bind_video(&self, element: SharedElement) -> bool {
        self.is_active() && self.inner.binder.bind_video(element)
    }

    /// Re-run discovery now
    pub fn rescan(&self) -> Option<ElementId> {
        if !self.is_active() {
            return None;
        }
        self.inner.binder.rescan()
    }

    pub fn active_element(&self) -> Option<SharedElement> {
        self.inner.binder.active_element()
    }

    pub fn active_machine(&self) -> Option<Arc<PlaybackMachine>> {
        self.inner.binder.active_machine()
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.active_machine().map(|machine| machine.state())
    }

    /// Most recent smart pause of the active binding
    pub fn last_auto_pause(&self) -> Option<PauseReason> {
        self.active_machine()
            .and_then(|machine| machine.policy().last_pause())
            .map(|(reason, _)| reason)
    }

    /// Drop cached entries that belong to another server or user
    pub fn refresh_scope(&self) {
        self.inner.ctx.metadata.invalidate_scope();
    }
}

/// Host-held slot enforcing a single active monitor
#[derive(Default)]
pub struct MonitorSlot {
    current: Mutex<Option<Monitor>>,
}

impl MonitorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a monitor, or return the one already running
    pub fn setup(&self, host: Host, config: MonitorConfig, labels: Labels) -> Result<Monitor> {
        let mut current = self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(monitor) = current.as_ref().filter(|monitor| monitor.is_active()) {
            debug!("Monitor already active; setup is a no-op");
            return Ok(monitor.clone());
        }
        let monitor = setup(host, config, labels)?;
        *current = Some(monitor.clone());
        Ok(monitor)
    }

    pub fn current(&self) -> Option<Monitor> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .filter(Monitor::is_active)
    }

    /// Destroy the running monitor, if any
    pub fn destroy(&self) {
        let monitor = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(monitor) = monitor {
            monitor.destroy();
        }
    }
}
