//! Integration Tests for the Reactive Core
//!
//! These tests exercise the observable guarantees of the runtime across
//! modules: dependency collection, write batching, flush ordering,
//! dependency pruning, array notification, keyed reconciliation, the
//! circular-update guard, and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use weft_core::error::{CoreError, WatcherKind};
use weft_core::reactive::{
    observe, ObservedObject, Scheduler, SchedulerConfig, Value, Watcher, WatcherOptions,
};
use weft_core::render::{MemHandle, MemoryBackend, Patcher, VNode, VNodeRef};

fn reactive(source: serde_json::Value) -> Value {
    let value = Value::from(source);
    observe(&value);
    value
}

fn object_of(value: &Value) -> ObservedObject {
    value.as_object().expect("object state").clone()
}

/// Watcher that re-runs whenever `key` changes, counting its runs.
fn counting_watcher(
    scheduler: &Scheduler,
    obj: &ObservedObject,
    key: &'static str,
) -> (Watcher, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in_getter = runs.clone();
    let reader = obj.clone();
    let watcher = Watcher::new(
        scheduler,
        move || {
            runs_in_getter.fetch_add(1, Ordering::SeqCst);
            Ok(reader.get(key).unwrap_or(Value::Null))
        },
        None,
        WatcherOptions::default(),
    );
    (watcher, runs)
}

/// Reading a property while a watcher is current subscribes the watcher:
/// a later write with a different value re-runs it exactly once, a write of
/// an equal value not at all.
#[test]
fn dependency_collection_is_automatic_and_exact() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "k": 1 }));
    let obj = object_of(&state);
    let (_watcher, runs) = counting_watcher(&scheduler, &obj, "k");

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    obj.set_field("k", Value::Int(2));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    obj.set_field("k", Value::Int(2));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// NaN over NaN counts as "no change" and never notifies.
#[test]
fn nan_writes_are_no_ops() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "k": 0.0 }));
    let obj = object_of(&state);
    let (_watcher, runs) = counting_watcher(&scheduler, &obj, "k");

    obj.set_field("k", Value::Float(f64::NAN));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    obj.set_field("k", Value::Float(f64::NAN));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// N synchronous writes to N different properties observed by the same
/// watcher produce exactly one run per flush cycle.
#[test]
fn writes_batch_into_a_single_flush() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "a": 0, "b": 0, "c": 0 }));
    let obj = object_of(&state);

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in_getter = runs.clone();
    let reader = obj.clone();
    let _watcher = Watcher::new(
        &scheduler,
        move || {
            runs_in_getter.fetch_add(1, Ordering::SeqCst);
            let total = ["a", "b", "c"]
                .iter()
                .filter_map(|key| reader.get(key))
                .filter_map(|v| v.as_int())
                .sum::<i64>();
            Ok(Value::Int(total))
        },
        None,
        WatcherOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    obj.set_field("a", Value::Int(1));
    obj.set_field("b", Value::Int(2));
    obj.set_field("c", Value::Int(3));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Watchers dirtied in the same flush run in creation order, whatever the
/// order of the writes that dirtied them.
#[test]
fn flush_respects_creation_order() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "a": 0, "b": 0 }));
    let obj = object_of(&state);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut watchers = Vec::new();
    for (key, tag) in [("a", "first"), ("b", "second")] {
        let order_in_getter = order.clone();
        let reader = obj.clone();
        watchers.push(Watcher::new(
            &scheduler,
            move || {
                order_in_getter.lock().push(tag);
                Ok(reader.get(key).unwrap_or(Value::Null))
            },
            None,
            WatcherOptions::default(),
        ));
    }
    order.lock().clear();

    // dirty the later watcher first
    obj.set_field("b", Value::Int(1));
    obj.set_field("a", Value::Int(1));
    scheduler.run_pending();

    assert_eq!(order.lock().as_slice(), &["first", "second"]);
}

/// A dependency read on run 1 but not on run 2 stops triggering the watcher.
#[test]
fn conditional_reads_prune_stale_dependencies() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "use_a": true, "a": 1, "b": 2 }));
    let obj = object_of(&state);

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in_getter = runs.clone();
    let reader = obj.clone();
    let watcher = Watcher::new(
        &scheduler,
        move || {
            runs_in_getter.fetch_add(1, Ordering::SeqCst);
            let use_a = reader
                .get("use_a")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let key = if use_a { "a" } else { "b" };
            Ok(reader.get(key).unwrap_or(Value::Null))
        },
        None,
        WatcherOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.dep_count(), 2);

    obj.set_field("use_a", Value::Bool(false));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(watcher.dep_count(), 2);

    // no longer read; must not trigger
    obj.set_field("a", Value::Int(99));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    obj.set_field("b", Value::Int(99));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Structure-changing array operations notify watchers of the array, and
/// inserted containers become independently observable.
#[test]
fn array_mutations_notify_and_wrap_new_elements() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "items": [] }));
    let obj = object_of(&state);
    let items = obj.get_untracked("items").unwrap().as_array().unwrap().clone();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_in_getter = runs.clone();
    let reader = items.clone();
    let _watcher = Watcher::new(
        &scheduler,
        move || {
            runs_in_getter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Int(reader.snapshot().len() as i64))
        },
        None,
        WatcherOptions::default(),
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let element = Value::from(json!({ "done": false }));
    items.push(element.clone());
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // the pushed element is now tracked state of its own
    let element_obj = element.as_object().unwrap().clone();
    assert!(element_obj.is_observed());
    let (_elem_watcher, elem_runs) = counting_watcher(&scheduler, &element_obj, "done");
    element_obj.set_field("done", Value::Bool(true));
    scheduler.run_pending();
    assert_eq!(elem_runs.load(Ordering::SeqCst), 2);
}

fn keyed_list(items: &[(&str, i64)]) -> VNodeRef<MemHandle> {
    VNode::element("ul")
        .with_children(
            items
                .iter()
                .map(|(text, key)| {
                    VNode::element("li")
                        .with_key(*key)
                        .with_text(*text)
                        .into_ref()
                })
                .collect(),
        )
        .into_ref()
}

/// Appending one keyed child materializes exactly that child and moves
/// nothing.
#[test]
fn keyed_diff_append_is_minimal() {
    let patcher = Patcher::new(MemoryBackend::new());
    let old = keyed_list(&[("a", 1), ("b", 2), ("c", 3)]);
    let root = patcher.patch(None, Some(&old)).unwrap();
    patcher.backend().take_ops();

    let new = keyed_list(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
    patcher.patch(Some(&old), Some(&new));

    assert_eq!(patcher.backend().created_count(), 1);
    assert_eq!(patcher.backend().moved_count(), 0);
    assert_eq!(patcher.backend().removed_count(), 0);
    assert_eq!(
        patcher.backend().dump(root),
        "<ul><li>a</li><li>b</li><li>c</li><li>d</li></ul>"
    );
}

/// Reordering keyed children moves live nodes without materializing or
/// destroying anything.
#[test]
fn keyed_diff_reorder_moves_only() {
    let patcher = Patcher::new(MemoryBackend::new());
    let old = keyed_list(&[("a", 1), ("b", 2), ("c", 3)]);
    let root = patcher.patch(None, Some(&old)).unwrap();
    patcher.backend().take_ops();

    let new = keyed_list(&[("c", 3), ("a", 1), ("b", 2)]);
    patcher.patch(Some(&old), Some(&new));

    assert_eq!(patcher.backend().created_count(), 0);
    assert_eq!(patcher.backend().removed_count(), 0);
    assert!(patcher.backend().moved_count() >= 1);
    assert_eq!(
        patcher.backend().dump(root),
        "<ul><li>c</li><li>a</li><li>b</li></ul>"
    );
}

/// An equal key on a different tag is a collision: the child is recreated,
/// never patched across tags.
#[test]
fn keyed_diff_replaces_on_tag_collision() {
    let patcher = Patcher::new(MemoryBackend::new());
    let old = VNode::element("ul")
        .with_children(vec![VNode::element("div")
            .with_key(1)
            .with_text("a")
            .into_ref()])
        .into_ref();
    let root = patcher.patch(None, Some(&old)).unwrap();
    patcher.backend().take_ops();

    let new = VNode::element("ul")
        .with_children(vec![VNode::element("span")
            .with_key(1)
            .with_text("a")
            .into_ref()])
        .into_ref();
    patcher.patch(Some(&old), Some(&new));

    assert_eq!(patcher.backend().created_count(), 1);
    assert_eq!(patcher.backend().removed_count(), 1);
    assert_eq!(patcher.backend().dump(root), "<ul><span>a</span></ul>");
}

/// A watcher whose callback unconditionally re-dirties itself is reported
/// and abandoned after the ceiling instead of hanging the flush.
#[test]
fn circular_updates_are_detected_and_halted() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        max_update_count: 3,
        ..SchedulerConfig::default()
    });
    let circular_reports = Arc::new(Mutex::new(Vec::new()));
    let reports_in_hook = circular_reports.clone();
    scheduler.set_error_hook(move |err| {
        if let CoreError::CircularUpdate { id, kind } = err {
            reports_in_hook.lock().push((*id, *kind));
        }
    });

    let state = reactive(json!({ "n": 0 }));
    let obj = object_of(&state);

    let reader = obj.clone();
    let writer = obj.clone();
    let watcher = Watcher::new(
        &scheduler,
        move || Ok(reader.get("n").unwrap_or(Value::Null)),
        Some(Box::new(move |new, _old| {
            let next = new.as_int().unwrap_or(0) + 1;
            writer.set_field("n", Value::Int(next));
            Ok(())
        })),
        WatcherOptions {
            user: true,
            ..WatcherOptions::default()
        },
    );

    obj.set_field("n", Value::Int(1));
    scheduler.run_pending();

    let reports = circular_reports.lock();
    assert_eq!(reports.as_slice(), &[(watcher.id(), WatcherKind::User)]);
}

/// After teardown, writes to previously tracked state no longer reach the
/// watcher, and every subscription is gone.
#[test]
fn teardown_severs_all_subscriptions() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "k": 0 }));
    let obj = object_of(&state);
    let (watcher, runs) = counting_watcher(&scheduler, &obj, "k");

    watcher.teardown();
    assert_eq!(watcher.dep_count(), 0);

    obj.set_field("k", Value::Int(5));
    scheduler.run_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A lazy watcher recomputes on demand, and an outer watcher reading it
/// inherits its dependencies through `depend`.
#[test]
fn lazy_watchers_chain_through_depend() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "count": 2 }));
    let obj = object_of(&state);

    let computes = Arc::new(AtomicUsize::new(0));
    let computes_in_getter = computes.clone();
    let reader = obj.clone();
    let doubled = Watcher::new(
        &scheduler,
        move || {
            computes_in_getter.fetch_add(1, Ordering::SeqCst);
            let count = reader.get("count").and_then(|v| v.as_int()).unwrap_or(0);
            Ok(Value::Int(count * 2))
        },
        None,
        WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        },
    );
    assert_eq!(computes.load(Ordering::SeqCst), 0);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_getter = observed.clone();
    let doubled_in_getter = doubled.clone();
    let _outer = Watcher::new(
        &scheduler,
        move || {
            if doubled_in_getter.is_dirty() {
                doubled_in_getter.evaluate()?;
            }
            doubled_in_getter.depend();
            let value = doubled_in_getter.value();
            observed_in_getter.lock().push(value.as_int());
            Ok(value)
        },
        None,
        WatcherOptions::default(),
    );
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert_eq!(observed.lock().as_slice(), &[Some(4)]);

    obj.set_field("count", Value::Int(5));
    scheduler.run_pending();
    assert_eq!(computes.load(Ordering::SeqCst), 2);
    assert_eq!(observed.lock().as_slice(), &[Some(4), Some(10)]);
}

/// One failing callback is reported and does not block the rest of the
/// queue.
#[test]
fn callback_failure_does_not_block_the_flush() {
    let scheduler = Scheduler::new();
    let reported = Arc::new(AtomicUsize::new(0));
    let reported_in_hook = reported.clone();
    scheduler.set_error_hook(move |err| {
        if matches!(err, CoreError::Callback { .. }) {
            reported_in_hook.fetch_add(1, Ordering::SeqCst);
        }
    });

    let state = reactive(json!({ "k": 0 }));
    let obj = object_of(&state);

    let reader = obj.clone();
    let _failing = Watcher::new(
        &scheduler,
        move || Ok(reader.get("k").unwrap_or(Value::Null)),
        Some(Box::new(|_new, _old| Err("listener exploded".into()))),
        WatcherOptions {
            user: true,
            label: Some("failing listener".into()),
            ..WatcherOptions::default()
        },
    );
    let (_healthy, healthy_runs) = counting_watcher(&scheduler, &obj, "k");

    obj.set_field("k", Value::Int(1));
    scheduler.run_pending();

    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(healthy_runs.load(Ordering::SeqCst), 2);
}

/// Full cycle: a render watcher rebuilds the virtual tree from reactive
/// state and reconciles it against the previous cycle's tree.
#[test]
fn render_watcher_drives_the_patcher() {
    let scheduler = Scheduler::new();
    let state = reactive(json!({ "todos": ["write", "test"] }));
    let obj = object_of(&state);
    let todos = obj
        .get_untracked("todos")
        .unwrap()
        .as_array()
        .unwrap()
        .clone();

    let patcher = Arc::new(Patcher::new(MemoryBackend::new()));
    let previous: Arc<Mutex<Option<VNodeRef<MemHandle>>>> = Arc::new(Mutex::new(None));

    let reader = todos.clone();
    let patcher_in_getter = patcher.clone();
    let previous_in_getter = previous.clone();
    let _render = Watcher::new(
        &scheduler,
        move || {
            let tree = VNode::element("ul")
                .with_children(
                    reader
                        .snapshot()
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_owned))
                        .map(|text| {
                            VNode::element("li")
                                .with_key(text.clone())
                                .with_text(text)
                                .into_ref()
                        })
                        .collect(),
                )
                .into_ref();
            let old = previous_in_getter.lock().take();
            patcher_in_getter.patch(old.as_ref(), Some(&tree));
            *previous_in_getter.lock() = Some(tree);
            Ok(Value::Null)
        },
        None,
        WatcherOptions {
            label: Some("render".into()),
            ..WatcherOptions::default()
        },
    );

    let root = previous.lock().as_ref().unwrap().handle().unwrap();
    assert_eq!(
        patcher.backend().dump(root),
        "<ul><li>write</li><li>test</li></ul>"
    );

    patcher.backend().take_ops();
    todos.push(Value::str("ship"));
    scheduler.run_pending();

    assert_eq!(
        patcher.backend().dump(root),
        "<ul><li>write</li><li>test</li><li>ship</li></ul>"
    );
    // append reuses both existing children
    assert_eq!(patcher.backend().created_count(), 1);
    assert_eq!(patcher.backend().moved_count(), 0);
}
