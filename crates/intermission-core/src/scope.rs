//! Resource scope - a cancellable arena for timers, observers and cleanups
//!
//! Every timer, repeating timer, animation-frame callback, change-observer and
//! cleanup callback created by the monitor is registered in a scope, so one
//! `cancel_all()` undoes everything. After cancellation no owned resource fires
//! again and late registrations are rejected.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Delay used for animation-frame callbacks (~60 Hz)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Handle to a pending timer, interval, frame or tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Disposal token returned by [`ResourceScope::track_cleanup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CleanupToken(u64);

/// A change-observer owned by a scope, disconnected on cancellation
pub trait ChangeObserver: Send {
    fn disconnect(&mut self);
}

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    tasks: HashMap<u64, JoinHandle<()>>,
    frame: Option<(u64, JoinHandle<()>)>,
    observers: Vec<Box<dyn ChangeObserver>>,
    cleanups: BTreeMap<u64, Cleanup>,
}

struct ScopeInner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<ScopeState>,
}

impl ScopeInner {
    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Forget a finished task; returns whether its callback may still run
    fn take_task(&self, id: u64) -> bool {
        self.lock().tasks.remove(&id);
        !self.is_cancelled()
    }

    fn take_frame(&self, id: u64) -> bool {
        let mut state = self.lock();
        let current = matches!(state.frame, Some((frame_id, _)) if frame_id == id);
        if current {
            state.frame = None;
        }
        current && !self.is_cancelled()
    }
}

/// Cancellable owner of every deferred resource used by the monitor
#[derive(Clone)]
pub struct ResourceScope {
    inner: Arc<ScopeInner>,
}

impl ResourceScope {
    /// Create a fresh, live scope
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    /// Create a scope that is cancelled together with this one.
    ///
    /// Cancelling the child alone detaches it from the parent.
    pub fn child(&self) -> ResourceScope {
        let child = ResourceScope::new();
        let handle = child.clone();
        if let Some(token) = self.track_cleanup(move || handle.cancel_all()) {
            let parent = self.clone();
            child.track_cleanup(move || {
                parent.untrack(token);
            });
        }
        child
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Run `callback` once after `delay`
    pub fn add_timeout<F>(&self, delay: Duration, callback: F) -> Option<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.register_task(move |inner, id| async move {
            time::sleep(delay).await;
            if inner.take_task(id) {
                callback();
            }
        })
    }

    /// Run `callback` every `period`, first after one period
    pub fn add_interval<F>(&self, period: Duration, mut callback: F) -> Option<TimerId>
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.register_task(move |inner, _id| async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if inner.is_cancelled() {
                    break;
                }
                callback();
            }
        })
    }

    /// Schedule `callback` on the next frame, superseding any pending frame
    pub fn add_animation_frame<F>(&self, callback: F) -> Option<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_cancelled() {
            return None;
        }
        let runtime = runtime_handle()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let future = async move {
            time::sleep(FRAME_INTERVAL).await;
            if inner.take_frame(id) {
                callback();
            }
        };

        let mut state = self.inner.lock();
        if self.is_cancelled() {
            return None;
        }
        let handle = runtime.spawn(future);
        if let Some((_, previous)) = state.frame.replace((id, handle)) {
            previous.abort();
        }
        Some(TimerId(id))
    }

    /// Run an async continuation owned by this scope
    pub fn spawn<Fut>(&self, future: Fut) -> Option<TimerId>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_task(move |inner, id| async move {
            future.await;
            inner.take_task(id);
        })
    }

    /// Cancel one pending timer, interval, frame or task
    pub fn clear(&self, id: TimerId) -> bool {
        let mut state = self.inner.lock();
        if let Some(handle) = state.tasks.remove(&id.0) {
            handle.abort();
            return true;
        }
        if matches!(state.frame, Some((frame_id, _)) if frame_id == id.0) {
            if let Some((_, handle)) = state.frame.take() {
                handle.abort();
            }
            return true;
        }
        false
    }

    /// Take ownership of a change-observer. Returns false (and disconnects it) if cancelled.
    pub fn track_observer(&self, mut observer: Box<dyn ChangeObserver>) -> bool {
        {
            let mut state = self.inner.lock();
            if !self.is_cancelled() {
                state.observers.push(observer);
                return true;
            }
        }
        run_guarded("observer", move || observer.disconnect());
        false
    }

    /// Register a cleanup callback. On a cancelled scope it runs immediately.
    pub fn track_cleanup<F>(&self, cleanup: F) -> Option<CleanupToken>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.inner.lock();
            if !self.is_cancelled() {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                state.cleanups.insert(id, Box::new(cleanup));
                return Some(CleanupToken(id));
            }
        }
        run_guarded("cleanup", cleanup);
        None
    }

    /// Forget a cleanup without running it
    pub fn untrack(&self, token: CleanupToken) -> bool {
        self.inner.lock().cleanups.remove(&token.0).is_some()
    }

    /// Cancel everything. Idempotent; every cleanup runs exactly once even if another panics.
    pub fn cancel_all(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tasks, frame, observers, cleanups) = {
            let mut state = self.inner.lock();
            (
                std::mem::take(&mut state.tasks),
                state.frame.take(),
                std::mem::take(&mut state.observers),
                std::mem::take(&mut state.cleanups),
            )
        };

        let task_count = tasks.len();
        for (_, handle) in tasks {
            handle.abort();
        }
        if let Some((_, handle)) = frame {
            handle.abort();
        }
        for mut observer in observers {
            run_guarded("observer", move || observer.disconnect());
        }
        let cleanup_count = cleanups.len();
        let failed = cleanups
            .into_values()
            .map(|cleanup| run_guarded("cleanup", cleanup))
            .filter(|ok| !ok)
            .count();

        debug!(tasks = task_count, cleanups = cleanup_count, failed, "Resource scope cancelled");
    }

    /// Pending timers, intervals, frames and tasks
    pub fn pending(&self) -> usize {
        let state = self.inner.lock();
        state.tasks.len() + usize::from(state.frame.is_some())
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    pub fn cleanup_count(&self) -> usize {
        self.inner.lock().cleanups.len()
    }

    fn register_task<M, Fut>(&self, make: M) -> Option<TimerId>
    where
        M: FnOnce(Arc<ScopeInner>, u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_cancelled() {
            debug!("Rejected registration on cancelled scope");
            return None;
        }
        let runtime = runtime_handle()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let future = make(self.inner.clone(), id);

        let mut state = self.inner.lock();
        if self.is_cancelled() {
            return None;
        }
        state.tasks.insert(id, runtime.spawn(future));
        Some(TimerId(id))
    }
}

impl Default for ResourceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn runtime_handle() -> Option<tokio::runtime::Handle> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            warn!("No async runtime available; timer not scheduled");
            None
        }
    }
}

/// Run a callback, swallowing panics so one failure cannot block the rest
fn run_guarded<F: FnOnce()>(what: &str, f: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            warn!(resource = what, "Resource callback panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = count.clone();
        (count, move || read.load(Ordering::SeqCst))
    }

    struct CountingObserver(Arc<AtomicUsize>);

    impl ChangeObserver for CountingObserver {
        fn disconnect(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_after_delay() {
        let scope = ResourceScope::new();
        let (count, fired) = counter();
        scope.add_timeout(Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired(), 0);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired(), 1);
        assert_eq!(scope.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_until_cleared() {
        let scope = ResourceScope::new();
        let (count, fired) = counter();
        let id = scope
            .add_interval(Duration::from_secs(1), move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(fired(), 3);
        assert!(scope.clear(id));
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_animation_frame_supersedes_pending() {
        let scope = ResourceScope::new();
        let (first, first_fired) = counter();
        let (second, second_fired) = counter();
        scope.add_animation_frame(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        scope.add_animation_frame(move || {
            second.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first_fired(), 0);
        assert_eq!(second_fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_everything() {
        let scope = ResourceScope::new();
        let (count, fired) = counter();
        let timer_count = count.clone();
        scope.add_timeout(Duration::from_millis(100), move || {
            timer_count.fetch_add(1, Ordering::SeqCst);
        });
        let interval_count = count.clone();
        scope.add_interval(Duration::from_millis(100), move || {
            interval_count.fetch_add(1, Ordering::SeqCst);
        });
        let (disconnects, disconnected) = counter();
        assert!(scope.track_observer(Box::new(CountingObserver(disconnects))));

        scope.cancel_all();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fired(), 0);
        assert_eq!(disconnected(), 1);
        assert_eq!(scope.pending(), 0);
        assert_eq!(scope.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_registrations_rejected() {
        let scope = ResourceScope::new();
        scope.cancel_all();

        assert!(scope.add_timeout(Duration::from_millis(1), || {}).is_none());
        assert!(scope.add_interval(Duration::from_millis(1), || {}).is_none());
        assert!(scope.add_animation_frame(|| {}).is_none());
        assert!(scope.spawn(async {}).is_none());

        let (disconnects, disconnected) = counter();
        assert!(!scope.track_observer(Box::new(CountingObserver(disconnects))));
        assert_eq!(disconnected(), 1);

        let (count, ran) = counter();
        let token = scope.track_cleanup(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(token.is_none());
        assert_eq!(ran(), 1);
    }

    #[test]
    fn test_cancel_all_idempotent_and_survives_panicking_cleanup() {
        let scope = ResourceScope::new();
        let (count, ran) = counter();
        let before = count.clone();
        scope.track_cleanup(move || {
            before.fetch_add(1, Ordering::SeqCst);
        });
        scope.track_cleanup(|| panic!("cleanup failure"));
        let after = count.clone();
        scope.track_cleanup(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });

        scope.cancel_all();
        scope.cancel_all();

        assert_eq!(ran(), 2);
        assert!(scope.is_cancelled());
    }

    #[test]
    fn test_untrack_skips_cleanup() {
        let scope = ResourceScope::new();
        let (count, ran) = counter();
        let token = scope
            .track_cleanup(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(scope.untrack(token));
        assert!(!scope.untrack(token));
        scope.cancel_all();
        assert_eq!(ran(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_scope_follows_parent() {
        let parent = ResourceScope::new();
        let child = parent.child();
        let (count, fired) = counter();
        child.add_timeout(Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        parent.cancel_all();
        time::sleep(Duration::from_millis(200)).await;
        assert!(child.is_cancelled());
        assert_eq!(fired(), 0);
    }

    #[test]
    fn test_cancelled_child_detaches_from_parent() {
        let parent = ResourceScope::new();
        let child = parent.child();
        assert_eq!(parent.cleanup_count(), 1);

        child.cancel_all();
        assert_eq!(parent.cleanup_count(), 0);
        assert!(!parent.is_cancelled());
    }
}
