//! Watcher Implementation
//!
//! A Watcher wraps one computation (a render function, a derived value, or
//! a user callback) and tracks exactly which deps that computation touched
//! on its latest run.
//!
//! # Dependency Bookkeeping
//!
//! Each run collects deps into a scratch set while the previous run's set is
//! kept aside. After the run, every dep present in the old set but absent
//! from the new one is unsubscribed, and the sets are swapped. Conditional
//! branches in a computation change the dependency set every run; this
//! self-pruning keeps subscriptions exact without a full
//! unsubscribe-then-resubscribe pass.
//!
//! # Modes
//!
//! - `lazy`: the computation runs on demand (`evaluate`), not on
//!   construction, and a dependency change only marks the watcher dirty.
//! - `sync`: dependency changes re-run the watcher immediately instead of
//!   going through the batching queue.
//! - `deep`: after each run the result is traversed so nested state
//!   registers as dependencies too.
//! - `user`: computation failures are reported and the previous value kept,
//!   instead of surfacing to the render error path.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::error::CoreError;

use super::context::TrackingScope;
use super::dep::Dep;
use super::scheduler::Scheduler;
use super::traverse::traverse;
use super::value::{same_value, Value};

/// Failure type produced by computations and callbacks.
pub type ComputationError = Box<dyn std::error::Error + Send + Sync>;

/// A watcher's computation.
pub type Getter = dyn Fn() -> Result<Value, ComputationError> + Send + Sync;

/// Reaction invoked with `(new_value, old_value)` after a run that changed
/// the value.
pub type Callback = Box<dyn Fn(&Value, &Value) -> Result<(), ComputationError> + Send + Sync>;

/// Lifecycle hook attached to a watcher.
pub type Hook = Box<dyn Fn() + Send + Sync>;

/// Construction options for [`Watcher::new`].
#[derive(Default)]
pub struct WatcherOptions {
    /// Evaluate on demand instead of on construction.
    pub lazy: bool,
    /// Re-run immediately on notification, bypassing the queue.
    pub sync: bool,
    /// Track everything reachable from the computed value.
    pub deep: bool,
    /// The watcher was created by application code; its failures are
    /// reported, never propagated.
    pub user: bool,
    /// Name used in diagnostics and error reports.
    pub label: Option<String>,
    /// Invoked by the scheduler just before the watcher re-runs in a flush.
    pub before: Option<Hook>,
    /// Invoked by the scheduler after the flush, children before parents.
    pub after: Option<Hook>,
}

/// A subscriber wrapping one computation. Cloning the handle shares state.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    id: u64,
    scheduler: Scheduler,
    getter: Box<Getter>,
    callback: Option<Callback>,
    before: Option<Hook>,
    after: Option<Hook>,
    label: Option<String>,
    lazy: bool,
    sync: bool,
    deep: bool,
    user: bool,
    active: AtomicBool,
    dirty: AtomicBool,
    deps: Mutex<DepSets>,
    value: RwLock<Value>,
}

#[derive(Default)]
struct DepSets {
    deps: SmallVec<[Dep; 4]>,
    dep_ids: HashSet<u64>,
    new_deps: SmallVec<[Dep; 4]>,
    new_dep_ids: HashSet<u64>,
}

impl Watcher {
    /// Create a watcher on `scheduler`.
    ///
    /// Non-lazy watchers evaluate immediately to establish their initial
    /// dependency set; a failing initial computation is routed to the
    /// scheduler's report hook.
    pub fn new<G>(
        scheduler: &Scheduler,
        getter: G,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self
    where
        G: Fn() -> Result<Value, ComputationError> + Send + Sync + 'static,
    {
        let watcher = Self {
            inner: Arc::new(WatcherInner {
                id: scheduler.next_watcher_id(),
                scheduler: scheduler.clone(),
                getter: Box::new(getter),
                callback,
                before: options.before,
                after: options.after,
                label: options.label,
                lazy: options.lazy,
                sync: options.sync,
                deep: options.deep,
                user: options.user,
                active: AtomicBool::new(true),
                dirty: AtomicBool::new(options.lazy),
                deps: Mutex::new(DepSets::default()),
                value: RwLock::new(Value::Null),
            }),
        };

        if !watcher.inner.lazy {
            match watcher.get() {
                Ok(value) => *watcher.inner.value.write() = value,
                Err(err) => watcher.inner.scheduler.report(&err),
            }
        }

        watcher
    }

    /// Get the watcher's scheduler-scoped ID. Creation order is id order.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether the watcher was created by application code.
    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    /// Whether the watcher still reacts to notifications.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Whether a lazy watcher needs re-evaluation.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// The most recently computed value.
    pub fn value(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Number of deps the watcher currently subscribes to.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.lock().deps.len()
    }

    /// Run the computation inside a tracking scope and re-collect the
    /// dependency set.
    ///
    /// User-watcher failures are reported here and the previous value
    /// returned; other failures propagate to the caller (the scheduler's
    /// flush loop, which reports them).
    pub fn get(&self) -> Result<Value, CoreError> {
        let scope = TrackingScope::enter(self.clone());
        let outcome = (self.inner.getter)();
        let result = match outcome {
            Ok(value) => {
                if self.inner.deep {
                    traverse(&value);
                }
                Ok(value)
            }
            Err(err) => {
                if self.inner.user {
                    let err = CoreError::computation(self.context(), err.to_string(), true);
                    self.inner.scheduler.report(&err);
                    Ok(self.inner.value.read().clone())
                } else {
                    Err(CoreError::computation(self.context(), err.to_string(), false))
                }
            }
        };
        drop(scope);
        self.cleanup_deps();
        result
    }

    /// React to a dependency change: mark dirty (lazy), run now (sync), or
    /// hand off to the scheduler.
    pub(crate) fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.store(true, Ordering::SeqCst);
        } else if self.inner.sync {
            if let Err(err) = self.run() {
                self.inner.scheduler.report(&err);
            }
        } else {
            self.inner.scheduler.enqueue(self.clone());
        }
    }

    /// Re-run the computation and fire the callback when the value changed.
    ///
    /// Containers always count as changed: handle identity says nothing
    /// about mutated contents, so the conservative path fires. Callback
    /// failures are caught and reported here; only non-user computation
    /// failures surface as `Err`.
    pub fn run(&self) -> Result<(), CoreError> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.inner.value.read().clone();
        if !same_value(&value, &old) || value.is_container() || self.inner.deep {
            *self.inner.value.write() = value.clone();
            if let Some(callback) = &self.inner.callback {
                if let Err(err) = callback(&value, &old) {
                    let err = CoreError::callback(self.context(), err.to_string());
                    self.inner.scheduler.report(&err);
                }
            }
        }
        Ok(())
    }

    /// Force a lazy watcher to recompute and clear its dirty flag.
    pub fn evaluate(&self) -> Result<(), CoreError> {
        let value = self.get()?;
        *self.inner.value.write() = value;
        self.inner.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Re-register every dep this watcher holds on the current outer
    /// watcher. Lets a computation that reads a lazy watcher's cached value
    /// inherit its dependencies.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.inner.deps.lock().deps.iter().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and deactivate. Idempotent; safe to call
    /// from within the watcher's own callback.
    pub fn teardown(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            let mut sets = self.inner.deps.lock();
            for dep in sets.deps.iter() {
                dep.remove_sub(self.inner.id);
            }
            sets.deps.clear();
            sets.dep_ids.clear();
            sets.new_deps.clear();
            sets.new_dep_ids.clear();
        }
    }

    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let mut sets = self.inner.deps.lock();
        if !sets.new_dep_ids.contains(&id) {
            sets.new_dep_ids.insert(id);
            sets.new_deps.push(dep.clone());
            if !sets.dep_ids.contains(&id) {
                dep.add_sub(self.clone());
            }
        }
    }

    pub(crate) fn fire_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    pub(crate) fn fire_after(&self) {
        if let Some(after) = &self.inner.after {
            after();
        }
    }

    fn context(&self) -> String {
        self.inner
            .label
            .clone()
            .unwrap_or_else(|| format!("watcher {}", self.inner.id))
    }

    /// Unsubscribe from deps the latest run no longer touched, then swap the
    /// scratch set in as the current set.
    fn cleanup_deps(&self) {
        let mut sets = self.inner.deps.lock();
        let stale: Vec<Dep> = sets
            .deps
            .iter()
            .filter(|dep| !sets.new_dep_ids.contains(&dep.id()))
            .cloned()
            .collect();
        for dep in stale {
            dep.remove_sub(self.inner.id);
        }
        let DepSets {
            deps,
            dep_ids,
            new_deps,
            new_dep_ids,
        } = &mut *sets;
        std::mem::swap(deps, new_deps);
        std::mem::swap(dep_ids, new_dep_ids);
        new_deps.clear();
        new_dep_ids.clear();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}
