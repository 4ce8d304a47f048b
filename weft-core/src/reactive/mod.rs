//! Reactive System
//!
//! This module implements automatic dependency tracking and batched
//! re-computation: observed containers, deps, watchers, and the scheduler.
//!
//! # Concepts
//!
//! ## Observed containers
//!
//! Plain data (objects and arrays in the [`Value`] model) is activated with
//! [`observe`]. From then on, every field read performed while a watcher is
//! current registers that watcher as a dependent, with no explicit
//! subscription calls; every accepted write notifies exactly the watchers
//! that read the location.
//!
//! ## Watchers
//!
//! A [`Watcher`] wraps one computation (a render function, a cached
//! derived value, or a user callback) and re-collects its dependency set
//! on every run, so conditional reads prune stale subscriptions
//! automatically.
//!
//! ## The scheduler
//!
//! Writes do not re-run watchers directly. Dirty watchers queue on a
//! [`Scheduler`], which flushes once per tick in watcher-id order: each
//! affected computation runs at most once per logical update, parents
//! before children.
//!
//! # Implementation Notes
//!
//! The "current watcher" slot is a thread-local stack with a scoped guard,
//! which is what lets nested evaluation attribute dependency collection
//! correctly without explicit context threading. This transparent-tracking
//! approach is the one used by SolidJS, Vue, and Leptos.

mod context;
mod dep;
mod observer;
mod scheduler;
mod traverse;
mod value;
mod watcher;

pub use context::{current_watcher, is_tracking, TrackingScope};
pub use dep::Dep;
pub use observer::{
    observe, observe_root, remove, set, EntryKey, FieldOptions, ObservedArray, ObservedObject,
    ReactiveCell, SetterGuard,
};
pub use scheduler::{ErrorHook, FlushPolicy, QueueTick, Scheduler, SchedulerConfig, TickDriver};
pub use traverse::traverse;
pub use value::{same_value, Key, Value};
pub use watcher::{Callback, ComputationError, Getter, Hook, Watcher, WatcherOptions};
