//! Batched Update Scheduler
//!
//! The scheduler turns many property writes into one flush pass. Dirty
//! watchers are queued (deduplicated by id) and the whole queue runs on the
//! next tick, sorted ascending by watcher id. Id order is creation order,
//! which guarantees parents run before children and user watchers before the
//! render watcher that follows them.
//!
//! # Flush Semantics
//!
//! Flushing is not re-entrant: a notification that arrives while a flush is
//! in progress inserts the watcher into the live queue, ahead of the cursor
//! at its id-ascending position, so it still runs within the same pass. The
//! loop iterates by index rather than over a snapshot for the same reason.
//!
//! A watcher that keeps re-entering the queue during one flush (its own run
//! re-dirties it) is abandoned once its re-entry count passes the configured
//! ceiling; the diagnostic identifies the watcher and the flush continues
//! with everyone else.
//!
//! # Deferral
//!
//! When the first watcher is queued, a flush is scheduled through the
//! [`TickDriver`], the host's microtask seam. The default driver collects
//! scheduled flushes in a queue the host drains with
//! [`Scheduler::run_pending`]; deterministic tests use
//! [`FlushPolicy::Immediate`], which flushes synchronously on first enqueue.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, WatcherKind};

use super::watcher::Watcher;

/// When the queue is flushed relative to enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Schedule the flush through the tick driver (batched, the default).
    Deferred,
    /// Flush synchronously as soon as the first watcher is queued.
    Immediate,
}

/// Scheduler tunables.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Flush scheduling policy.
    pub policy: FlushPolicy,
    /// How many times one watcher may re-enter the queue during a single
    /// flush before it is abandoned.
    pub max_update_count: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: FlushPolicy::Deferred,
            max_update_count: 100,
        }
    }
}

/// The host's deferred-execution seam.
///
/// A UI host schedules the task on its microtask queue (or a timer
/// fallback); the default driver queues tasks for an explicit drain.
pub trait TickDriver: Send + Sync {
    /// Run `task` at the next tick.
    fn schedule(&self, task: Box<dyn FnOnce() + Send>);
}

/// Default tick driver: tasks accumulate until the host drains them.
pub struct QueueTick {
    tasks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl QueueTick {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run queued tasks until none remain (a task may schedule more).
    /// Returns how many tasks ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return ran;
            }
            for task in tasks {
                task();
                ran += 1;
            }
        }
    }
}

impl Default for QueueTick {
    fn default() -> Self {
        Self::new()
    }
}

impl TickDriver for QueueTick {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().push(task);
    }
}

/// Error hook invoked for every reported [`CoreError`].
pub type ErrorHook = Arc<dyn Fn(&CoreError) + Send + Sync>;

/// The batching scheduler. Cloning the handle shares state; one scheduler
/// instance is one independent runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    watcher_ids: AtomicU64,
    queue: Mutex<Vec<Watcher>>,
    queued_ids: Mutex<HashSet<u64>>,
    circular: Mutex<HashMap<u64, u32>>,
    flushing: AtomicBool,
    waiting: AtomicBool,
    index: AtomicUsize,
    default_tick: QueueTick,
    custom_tick: RwLock<Option<Arc<dyn TickDriver>>>,
    error_hook: RwLock<Option<ErrorHook>>,
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with explicit configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                watcher_ids: AtomicU64::new(1),
                queue: Mutex::new(Vec::new()),
                queued_ids: Mutex::new(HashSet::new()),
                circular: Mutex::new(HashMap::new()),
                flushing: AtomicBool::new(false),
                waiting: AtomicBool::new(false),
                index: AtomicUsize::new(0),
                default_tick: QueueTick::new(),
                custom_tick: RwLock::new(None),
                error_hook: RwLock::new(None),
            }),
        }
    }

    /// Install the host's tick driver. Replaces the queue-draining default.
    pub fn set_tick_driver(&self, driver: Arc<dyn TickDriver>) {
        *self.inner.custom_tick.write() = Some(driver);
    }

    /// Install the error report hook. Without one, reported errors go to the
    /// `tracing` error stream.
    pub fn set_error_hook(&self, hook: impl Fn(&CoreError) + Send + Sync + 'static) {
        *self.inner.error_hook.write() = Some(Arc::new(hook));
    }

    /// Route an error to the report hook.
    pub fn report(&self, err: &CoreError) {
        let hook = self.inner.error_hook.read().clone();
        match hook {
            Some(hook) => hook(err),
            None => tracing::error!(error = %err, "unhandled reactive error"),
        }
    }

    /// Queue a watcher for the next flush.
    ///
    /// A watcher already queued is left where it is. During a flush the
    /// insertion lands ahead of the cursor at its id position, so the
    /// watcher still runs in the current pass.
    pub fn enqueue(&self, watcher: Watcher) {
        let id = watcher.id();
        {
            let mut queued = self.inner.queued_ids.lock();
            if queued.contains(&id) {
                return;
            }
            queued.insert(id);
        }
        {
            let mut queue = self.inner.queue.lock();
            if !self.inner.flushing.load(Ordering::SeqCst) {
                queue.push(watcher);
            } else {
                let index = self.inner.index.load(Ordering::SeqCst);
                let mut at = queue.len();
                while at > index + 1 && queue[at - 1].id() > id {
                    at -= 1;
                }
                queue.insert(at, watcher);
            }
        }
        if !self.inner.waiting.swap(true, Ordering::SeqCst) {
            match self.inner.config.policy {
                FlushPolicy::Immediate => self.flush(),
                FlushPolicy::Deferred => {
                    let scheduler = self.clone();
                    self.tick(Box::new(move || scheduler.flush()));
                }
            }
        }
    }

    /// Drain flushes scheduled on the default tick driver. Returns how many
    /// tasks ran. A no-op when a custom driver is installed.
    pub fn run_pending(&self) -> usize {
        self.inner.default_tick.drain()
    }

    /// Run every queued watcher in id order, then fire deferred post-update
    /// hooks in reverse order and reset all bookkeeping.
    pub fn flush(&self) {
        self.inner.flushing.store(true, Ordering::SeqCst);
        self.inner.queue.lock().sort_by_key(Watcher::id);

        let mut index = 0usize;
        loop {
            let watcher = {
                let queue = self.inner.queue.lock();
                match queue.get(index) {
                    Some(watcher) => watcher.clone(),
                    None => break,
                }
            };
            self.inner.index.store(index, Ordering::SeqCst);
            watcher.fire_before();
            let id = watcher.id();
            self.inner.queued_ids.lock().remove(&id);
            if let Err(err) = watcher.run() {
                self.report(&err);
            }
            if self.inner.queued_ids.lock().contains(&id) {
                // the watcher's own run re-queued it
                let count = {
                    let mut circular = self.inner.circular.lock();
                    let entry = circular.entry(id).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if count > self.inner.config.max_update_count {
                    tracing::warn!(
                        watcher = id,
                        user = watcher.is_user(),
                        ceiling = self.inner.config.max_update_count,
                        "possible infinite update loop; abandoning watcher for this flush"
                    );
                    self.report(&CoreError::CircularUpdate {
                        id,
                        kind: WatcherKind::from_user_flag(watcher.is_user()),
                    });
                    self.inner.queued_ids.lock().remove(&id);
                    let mut queue = self.inner.queue.lock();
                    if let Some(pos) = (index + 1..queue.len()).find(|&i| queue[i].id() == id) {
                        queue.remove(pos);
                    }
                }
            }
            index += 1;
        }

        let processed = self.processed_snapshot();
        self.reset_state();
        for watcher in processed.iter().rev() {
            if watcher.is_active() {
                watcher.fire_after();
            }
        }
    }

    pub(crate) fn next_watcher_id(&self) -> u64 {
        self.inner.watcher_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue contents with re-entries collapsed, in run order.
    fn processed_snapshot(&self) -> Vec<Watcher> {
        let queue = self.inner.queue.lock();
        let mut seen = HashSet::new();
        queue
            .iter()
            .filter(|w| seen.insert(w.id()))
            .cloned()
            .collect()
    }

    fn reset_state(&self) {
        self.inner.queue.lock().clear();
        self.inner.queued_ids.lock().clear();
        self.inner.circular.lock().clear();
        self.inner.index.store(0, Ordering::SeqCst);
        self.inner.flushing.store(false, Ordering::SeqCst);
        self.inner.waiting.store(false, Ordering::SeqCst);
    }

    fn tick(&self, task: Box<dyn FnOnce() + Send>) {
        let custom = self.inner.custom_tick.read().clone();
        match custom {
            Some(driver) => driver.schedule(task),
            None => self.inner.default_tick.schedule(task),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
