//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive UI framework.
//! It implements:
//!
//! - Reactive state (observed containers, dependency tracking, watchers)
//! - Batched update scheduling with deterministic ordering
//! - Virtual-tree reconciliation behind a pluggable platform backend
//!
//! # Architecture
//!
//! The crate is organized into two subsystems:
//!
//! - `reactive`: converts plain data into tracked state and re-runs exactly
//!   the affected computations, batched per tick and ordered parent-first
//! - `render`: diffs a freshly computed tree description against the
//!   previous one and applies the minimal mutations to the live tree
//!
//! A render cycle ties them together: a render watcher's computation builds
//! a new virtual tree while its reads are tracked, and hands old and new
//! trees to the patcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::{observe, Scheduler, Value, Watcher, WatcherOptions};
//!
//! let scheduler = Scheduler::new();
//! let state = Value::from(serde_json::json!({ "count": 0 }));
//! observe(&state);
//!
//! let counter = state.as_object().unwrap().clone();
//! let watcher = Watcher::new(
//!     &scheduler,
//!     move || Ok(counter.get("count").unwrap_or(Value::Null)),
//!     Some(Box::new(|new, old| {
//!         println!("count: {:?} -> {:?}", old, new);
//!         Ok(())
//!     })),
//!     WatcherOptions::default(),
//! );
//!
//! state.as_object().unwrap().set_field("count", Value::Int(1));
//! scheduler.run_pending(); // prints: count: Int(0) -> Int(1)
//! ```

pub mod error;
pub mod reactive;
pub mod render;

pub use error::{CoreError, WatcherKind};
