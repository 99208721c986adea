//! Observers
//!
//! An observer is a side-effecting computation that re-runs whenever a node
//! it read changes.
//!
//! # How Observers Work
//!
//! 1. When created, the observer runs its function immediately with a fresh
//!    [`TrackingContext`] to establish its dependencies.
//!
//! 2. After each run, the nodes recorded in the context are diffed against
//!    the previous run's set. Listeners on nodes no longer read are removed;
//!    nodes read for the first time (or now read with different depth) get a
//!    listener.
//!
//! 3. When any of those listeners fires, the observer runs again. All of an
//!    observer's listeners share one [`ListenerId`], so a batch touching
//!    several dependencies re-runs it once.
//!
//! Writes an observer makes to its own dependencies while running do not
//! re-trigger it.
//!
//! # Lifetime
//!
//! Listeners only hold a weak reference to the observer. Dropping the last
//! [`Observer`] handle disposes it, like dropping a lattice handle
//! unregisters its computation.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::{TrackKey, TrackedNode, TrackingContext};
use super::notify::Change;
use super::subscriber::{Callback, Disposer, ListenerId};

/// Counter for generating unique observer IDs.
static OBSERVER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_observer_id() -> u64 {
    OBSERVER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Run = Box<dyn Fn(&TrackingContext) + Send + Sync>;

/// Run `f` now and again whenever a node it read changes.
///
/// # Example
///
/// ```rust,ignore
/// let state = observable(json!({"count": 0}));
///
/// let observer = observe({
///     let state = state.clone();
///     move |cx| println!("count is {:?}", state.child("count").get_tracked(cx))
/// });
///
/// state.child("count").set(5); // prints "count is Some(5)"
/// ```
pub fn observe<F>(f: F) -> Observer
where
    F: Fn(&TrackingContext) + Send + Sync + 'static,
{
    let inner = Arc::new_cyclic(|weak: &Weak<ObserverInner>| {
        let observer = weak.clone();
        let notify: Callback = Arc::new(move |_: &Change| {
            if let Some(observer) = observer.upgrade() {
                observer.execute();
            }
        });
        ObserverInner {
            id: next_observer_id(),
            listener: ListenerId::new(),
            notify,
            run: Box::new(f),
            deps: Mutex::new(IndexMap::new()),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        }
    });
    inner.execute();
    Observer { inner }
}

struct Dependency {
    shallow: bool,
    disposer: Disposer,
}

struct ObserverInner {
    id: u64,
    /// Shared by every dependency registration.
    listener: ListenerId,
    notify: Callback,
    run: Run,
    deps: Mutex<IndexMap<TrackKey, Dependency>>,
    disposed: AtomicBool,
    running: AtomicBool,
    run_count: AtomicUsize,
}

impl ObserverInner {
    fn execute(self: &Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) || self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let cx = TrackingContext::new();
        (self.run)(&cx);
        let tracked = cx.into_nodes();

        if self.disposed.load(Ordering::SeqCst) {
            self.clear();
        } else {
            self.resubscribe(tracked);
        }

        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.running.store(false, Ordering::SeqCst);
        tracing::trace!(observer = self.id, runs, "observer ran");
    }

    fn resubscribe(self: &Arc<Self>, tracked: IndexMap<TrackKey, TrackedNode>) {
        let mut deps = self.deps.lock();

        let stale: Vec<TrackKey> = deps
            .iter()
            .filter(|(key, dep)| tracked.get(*key).map_or(true, |node| node.shallow != dep.shallow))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            if let Some(dep) = deps.shift_remove(&key) {
                dep.disposer.dispose();
            }
        }

        for (key, node) in tracked {
            if deps.contains_key(&key) {
                continue;
            }
            let disposer = node
                .observable
                .listen_as(self.listener, node.shallow, Arc::clone(&self.notify));
            deps.insert(
                key,
                Dependency {
                    shallow: node.shallow,
                    disposer,
                },
            );
        }
    }

    fn clear(&self) {
        for (_, dep) in self.deps.lock().drain(..) {
            dep.disposer.dispose();
        }
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        for (_, dep) in self.deps.get_mut().drain(..) {
            dep.disposer.dispose();
        }
    }
}

/// Handle to a running observer.
#[must_use = "dropping the last Observer handle disposes it"]
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    /// Get the observer's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop the observer and remove all of its listeners.
    ///
    /// Notifications already queued by an open batch still arrive, but the
    /// observer ignores them.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.clear();
    }

    /// Check if the observer has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the observer has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of nodes the last run depended on.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
