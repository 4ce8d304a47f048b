//! Tracking Context
//!
//! Exactly one watcher is "current" at any instant; reads that happen while
//! it is current are attributed to it. Nested evaluation (a render
//! computation evaluating a lazy watcher it reads) is supported by keeping a
//! stack rather than a single slot.
//!
//! The stack is thread-local, so independent runtimes running on different
//! threads (the usual situation in tests) never see each other's tracking
//! state. Push/pop is disciplined through a scoped guard that restores the
//! previous watcher on every exit path, including panics.

use std::cell::RefCell;

use super::watcher::Watcher;

thread_local! {
    static WATCHER_STACK: RefCell<Vec<Watcher>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the tracking stack when dropped.
pub struct TrackingScope {
    watcher_id: u64,
}

impl TrackingScope {
    /// Make `watcher` the current watcher until the returned guard drops.
    pub fn enter(watcher: Watcher) -> Self {
        let watcher_id = watcher.id();
        WATCHER_STACK.with(|stack| stack.borrow_mut().push(watcher));
        Self { watcher_id }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        WATCHER_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(watcher) = popped {
                debug_assert_eq!(
                    watcher.id(),
                    self.watcher_id,
                    "tracking scope mismatch: expected watcher {}, got {}",
                    self.watcher_id,
                    watcher.id()
                );
            }
        });
    }
}

/// The watcher currently collecting dependencies, if any.
pub fn current_watcher() -> Option<Watcher> {
    WATCHER_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Whether any watcher is currently collecting dependencies.
pub fn is_tracking() -> bool {
    WATCHER_STACK.with(|stack| !stack.borrow().is_empty())
}
