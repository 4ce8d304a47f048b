//! Dependency Objects
//!
//! A `Dep` is a publish point. Every reactive cell owns one, and every
//! observed container owns one more for structural changes. Watchers register
//! themselves on the deps they touch while computing; `notify` marks each
//! registered watcher for re-evaluation.
//!
//! Subscriber membership is set-like (a watcher registers at most once) but
//! physically a list, so notify order is deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::context;
use super::watcher::Watcher;

/// Counter for generating unique dep IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A publish point linking one reactive location to its subscribers.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    id: u64,
    subs: RwLock<SmallVec<[Watcher; 4]>>,
}

impl Dep {
    /// Create a new dep with a fresh ID.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                subs: RwLock::new(SmallVec::new()),
            }),
        }
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Register the current watcher (if any) on this dep.
    ///
    /// The watcher records the dep in its per-run scratch set; the first time
    /// a dep is seen across runs the watcher also adds itself to the
    /// subscriber list. Both directions are idempotent.
    pub fn depend(&self) {
        if let Some(watcher) = context::current_watcher() {
            watcher.add_dep(self);
        }
    }

    /// Notify every subscriber that the published value changed.
    ///
    /// Iterates over a snapshot so subscribers may mutate the list while
    /// being notified (e.g. a watcher tearing itself down). The snapshot is
    /// sorted by watcher id so delivery order is deterministic even for
    /// watchers that run synchronously and never reach the batching queue.
    pub fn notify(&self) {
        let mut subs: Vec<Watcher> = self.inner.subs.read().iter().cloned().collect();
        subs.sort_by_key(Watcher::id);
        for watcher in subs {
            watcher.update();
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.read().len()
    }

    pub(crate) fn add_sub(&self, watcher: Watcher) {
        self.inner.subs.write().push(watcher);
    }

    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.inner.subs.write().retain(|w| w.id() != watcher_id);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
