//! Media target discovery and binding
//!
//! Exactly one element is bound at a time. Each binding owns a child
//! [`ResourceScope`] holding its listeners, badge poll and policy interval, so
//! unbinding is a single `cancel_all()` on that child.

use crate::{
    host::{CandidateSource, MediaElement, MediaEvent, PreviewPredicate, SharedElement},
    monitor::MonitorContext,
    playback::PlaybackMachine,
    scope::ResourceScope,
    types::ElementId,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Backoff factor between fallback polling attempts
const POLL_BACKOFF: f64 = 1.6;

/// Upper bound of one fallback polling delay
const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

/// Finds the media element worth monitoring
pub struct Discovery {
    candidates: Arc<dyn CandidateSource>,
    preview: Option<Arc<dyn PreviewPredicate>>,
    max_depth: usize,
}

impl Discovery {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        preview: Option<Arc<dyn PreviewPredicate>>,
        max_depth: usize,
    ) -> Self {
        Self {
            candidates,
            preview,
            max_depth,
        }
    }

    pub fn source(&self) -> &Arc<dyn CandidateSource> {
        &self.candidates
    }

    /// Preview/trailer elements never get the overlay. The host's predicate
    /// decides; the structural check only runs when it has no opinion.
    pub fn is_preview(&self, element: &dyn MediaElement) -> bool {
        if let Some(verdict) = self
            .preview
            .as_ref()
            .and_then(|predicate| predicate.is_preview(element))
        {
            return verdict;
        }
        element.is_muted() && element.is_autoplay() && element.in_preview_container()
    }

    /// First connected, non-preview element in tree order
    pub fn find_target(&self) -> Option<SharedElement> {
        self.candidates
            .candidates(self.max_depth)
            .into_iter()
            .find(|element| element.is_connected() && !self.is_preview(element.as_ref()))
    }
}

struct ActiveBinding {
    element_id: ElementId,
    machine: Arc<PlaybackMachine>,
}

#[derive(Default)]
struct BinderState {
    active: Option<ActiveBinding>,
    generation: u64,
    watching: bool,
}

/// Owns the single active binding
pub struct Binder {
    ctx: Arc<MonitorContext>,
    scope: ResourceScope,
    discovery: Discovery,
    state: Mutex<BinderState>,
    weak: Weak<Binder>,
}

impl Binder {
    pub fn new(ctx: Arc<MonitorContext>, scope: ResourceScope, discovery: Discovery) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            ctx,
            scope,
            discovery,
            state: Mutex::new(BinderState::default()),
            weak: weak.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BinderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn active_machine(&self) -> Option<Arc<PlaybackMachine>> {
        self.lock().active.as_ref().map(|binding| binding.machine.clone())
    }

    pub fn active_element(&self) -> Option<SharedElement> {
        self.active_machine().map(|machine| machine.element().clone())
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Bind `element`, replacing any previous binding. Binding the element
    /// that is already bound is a no-op. Returns whether a new binding was made.
    pub fn bind_video(&self, element: SharedElement) -> bool {
        if self.scope.is_cancelled() {
            return false;
        }
        let element_id = element.id();

        let (previous, generation) = {
            let mut state = self.lock();
            if state
                .active
                .as_ref()
                .is_some_and(|binding| binding.element_id == element_id)
            {
                return false;
            }
            state.generation += 1;
            (state.active.take(), state.generation)
        };

        if let Some(previous) = previous {
            debug!(element = %previous.element_id, "Detaching previous binding");
            previous.machine.shutdown();
        }

        self.ctx.active_generation.store(generation, Ordering::SeqCst);
        let binding_scope = self.scope.child();
        let machine = PlaybackMachine::new(
            self.ctx.clone(),
            element.clone(),
            binding_scope.clone(),
            generation,
        );

        let listeners: Vec<_> = MediaEvent::BOUND
            .iter()
            .map(|event| {
                let weak = Arc::downgrade(&machine);
                element.add_listener(
                    *event,
                    Arc::new(move |event: MediaEvent| {
                        if let Some(machine) = weak.upgrade() {
                            machine.handle_event(event);
                        }
                    }),
                )
            })
            .collect();
        let detached = element.clone();
        binding_scope.track_cleanup(move || {
            for listener in listeners {
                detached.remove_listener(listener);
            }
        });

        let weak_binder = self.weak.clone();
        let weak_machine = Arc::downgrade(&machine);
        binding_scope.add_interval(self.ctx.config.smart_pause.check_interval(), move || {
            let (Some(binder), Some(machine)) = (weak_binder.upgrade(), weak_machine.upgrade()) else {
                return;
            };
            if !machine.element().is_connected() {
                binder.rescan();
            } else {
                machine.check_policy();
            }
        });

        {
            let mut state = self.lock();
            if state.generation != generation {
                drop(state);
                machine.shutdown();
                return false;
            }
            state.active = Some(ActiveBinding {
                element_id,
                machine: machine.clone(),
            });
        }

        info!(element = %element_id, generation, "Media element bound");
        machine.start();
        true
    }

    /// Tear down the active binding, clearing any overlay or badge it showed
    pub fn unbind(&self) -> bool {
        let previous = self.lock().active.take();
        match previous {
            Some(binding) => {
                info!(element = %binding.element_id, "Media element unbound");
                binding.machine.shutdown();
                true
            }
            None => false,
        }
    }

    /// Re-evaluate the candidate set. A disconnected binding is dropped; the
    /// first qualifying element in tree order wins, replacing the current
    /// binding when it differs. With no qualifying element a still-connected
    /// binding is kept.
    pub fn rescan(&self) -> Option<ElementId> {
        if self.scope.is_cancelled() {
            return None;
        }
        let current = match self.active_element() {
            Some(element) if !element.is_connected() => {
                debug!(element = %element.id(), "Bound element left the tree");
                self.unbind();
                None
            }
            other => other,
        };

        let Some(target) = self.discovery.find_target() else {
            return current.map(|element| element.id());
        };
        let id = target.id();
        if let Some(element) = current.filter(|element| element.id() != id) {
            debug!(from = %element.id(), to = %id, "Higher-priority target appeared");
        }
        self.bind_video(target);
        Some(id)
    }

    /// Start the change-observer and the bounded fallback polling
    pub fn start_watching(&self) {
        {
            let mut state = self.lock();
            if state.watching {
                return;
            }
            state.watching = true;
        }

        let weak = self.weak.clone();
        let observer = self.discovery.source().observe(Arc::new(move || {
            if let Some(binder) = weak.upgrade() {
                binder.rescan();
            }
        }));
        match observer {
            Some(observer) => {
                self.scope.track_observer(observer);
            }
            None => debug!("Host cannot observe the render tree; relying on polling"),
        }

        self.rescan();
        self.schedule_poll(0);
    }

    fn schedule_poll(&self, attempt: u32) {
        let config = &self.ctx.config;
        if attempt >= config.discovery_poll_attempts {
            return;
        }
        let base = config.discovery_poll_base_ms as f64;
        let delay = Duration::from_millis((base * POLL_BACKOFF.powi(attempt as i32)) as u64)
            .min(MAX_POLL_DELAY);

        let weak = self.weak.clone();
        self.scope.add_timeout(delay, move || {
            let Some(binder) = weak.upgrade() else {
                return;
            };
            binder.rescan();
            if binder.lock().active.is_none() {
                binder.schedule_poll(attempt + 1);
            } else {
                debug!(attempt, "Fallback polling found a target");
            }
        });
    }
}
