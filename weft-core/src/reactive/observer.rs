//! Observed Containers
//!
//! This module converts plain data into reactive data. An observed object
//! maps each field name to a [`ReactiveCell`] (a value paired with its own
//! [`Dep`]), built once at observation time. An observed array keeps its
//! elements plain but intercepts every structure-changing operation so the
//! array's structural dep is notified after the mutation.
//!
//! # How Observation Works
//!
//! 1. `observe` walks a container recursively, marking it and every nested
//!    container as observed. It is idempotent, skips primitives, and skips
//!    containers carrying the non-reactive marker.
//!
//! 2. Reading a field while a watcher is current registers the watcher on
//!    the field's dep, and on the structural dep of the field's value when
//!    that value is itself an observed container (deep collection
//!    dependency).
//!
//! 3. Writing a field compares against the stored value first (NaN over NaN
//!    counts as unchanged) and only then observes the new value and notifies.
//!
//! Element reads on arrays cannot be intercepted per-element, which is why
//! index writes must go through [`ObservedArray::set_index`] /
//! [`ObservedArray::remove_at`] (or the [`set`] / [`remove`] helpers): those
//! perform the splice-based equivalent so the mutation is notified.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::context;
use super::dep::Dep;
use super::value::{same_value, Value};

/// Development-time guard invoked before a cell accepts a new value.
pub type SetterGuard = Arc<dyn Fn(&Value) + Send + Sync>;

/// Per-field options for [`ObservedObject::define_field`].
#[derive(Default)]
pub struct FieldOptions {
    /// Do not observe values stored into this field.
    pub shallow: bool,
    /// Invoked with the incoming value before every accepted write.
    pub guard: Option<SetterGuard>,
}

/// A value paired with the dep that publishes its changes.
///
/// One cell exists per tracked field, constructed when the field is defined,
/// never per access.
pub struct ReactiveCell {
    value: RwLock<Value>,
    dep: Dep,
    shallow: bool,
    guard: Option<SetterGuard>,
}

impl ReactiveCell {
    fn new(value: Value, options: FieldOptions) -> Self {
        Self {
            value: RwLock::new(value),
            dep: Dep::new(),
            shallow: options.shallow,
            guard: options.guard,
        }
    }

    /// Read the value, registering the current watcher on this cell's dep
    /// and on the value's own structural dep when it is an observed
    /// container.
    pub fn get(&self) -> Value {
        let value = self.value.read().clone();
        if context::is_tracking() {
            self.dep.depend();
            match &value {
                Value::Object(obj) if obj.is_observed() => obj.dep().depend(),
                Value::Array(arr) if arr.is_observed() => {
                    arr.dep().depend();
                    depend_array(arr);
                }
                _ => {}
            }
        }
        value
    }

    /// Read the value without registering dependencies.
    pub fn get_untracked(&self) -> Value {
        self.value.read().clone()
    }

    /// Store a new value and notify, unless it is same-value with the
    /// current one.
    pub fn set(&self, new: Value) {
        {
            let current = self.value.read();
            if same_value(&current, &new) {
                return;
            }
        }
        if let Some(guard) = &self.guard {
            guard(&new);
        }
        if !self.shallow {
            observe(&new);
        }
        *self.value.write() = new;
        self.dep.notify();
    }
}

/// Register the current watcher on every observed element of `array`,
/// recursively. Element access is not interceptable, so touching the array
/// must stand in for touching its elements.
fn depend_array(array: &ObservedArray) {
    for item in array.snapshot_untracked() {
        match &item {
            Value::Object(obj) if obj.is_observed() => obj.dep().depend(),
            Value::Array(arr) if arr.is_observed() => {
                arr.dep().depend();
                depend_array(arr);
            }
            _ => {}
        }
    }
}

/// An observed plain-object container.
///
/// Cloning the handle shares state.
#[derive(Clone)]
pub struct ObservedObject {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    fields: RwLock<IndexMap<Arc<str>, Arc<ReactiveCell>>>,
    dep: Dep,
    observed: AtomicBool,
    raw: AtomicBool,
    root_count: AtomicUsize,
}

impl ObservedObject {
    /// Create an empty, not-yet-observed object.
    pub fn new() -> Self {
        Self::from_entries(std::iter::empty::<(Arc<str>, Value)>())
    }

    /// Create an object from field entries. Cells are built immediately;
    /// observation state is off until [`observe`] runs.
    pub fn from_entries(entries: impl IntoIterator<Item = (Arc<str>, Value)>) -> Self {
        let fields = entries
            .into_iter()
            .map(|(key, value)| (key, Arc::new(ReactiveCell::new(value, FieldOptions::default()))))
            .collect();
        Self {
            inner: Arc::new(ObjectInner {
                fields: RwLock::new(fields),
                dep: Dep::new(),
                observed: AtomicBool::new(false),
                raw: AtomicBool::new(false),
                root_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Whether two handles refer to the same container.
    pub fn handle_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a field, tracking it as a dependency of the current watcher.
    pub fn get(&self, key: &str) -> Option<Value> {
        let cell = self.inner.fields.read().get(key).cloned();
        cell.map(|cell| cell.get())
    }

    /// Read a field without registering dependencies.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        let cell = self.inner.fields.read().get(key).cloned();
        cell.map(|cell| cell.get_untracked())
    }

    /// Write a field.
    ///
    /// An existing field goes through its cell (same-value writes are
    /// no-ops). A missing field is defined and then announced through the
    /// structural dep, so watchers depending on the container see the added
    /// entry.
    pub fn set_field(&self, key: impl Into<Arc<str>>, value: Value) {
        let key = key.into();
        let existing = self.inner.fields.read().get(&*key).cloned();
        match existing {
            Some(cell) => cell.set(value),
            None => {
                self.define_field(key, value, FieldOptions::default());
                if self.is_observed() {
                    self.inner.dep.notify();
                }
            }
        }
    }

    /// Install a tracked field without announcing it (the counterpart of
    /// defining a property before the object is handed out).
    pub fn define_field(&self, key: impl Into<Arc<str>>, value: Value, options: FieldOptions) {
        if self.is_observed() && !options.shallow {
            observe(&value);
        }
        let cell = Arc::new(ReactiveCell::new(value, options));
        self.inner.fields.write().insert(key.into(), cell);
    }

    /// Remove a field and announce the structural change. Returns the
    /// removed value.
    pub fn remove_field(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut fields = self.inner.fields.write();
            fields.shift_remove(key)
        };
        let removed = removed.map(|cell| cell.get_untracked());
        if removed.is_some() {
            self.inner.dep.notify();
        }
        removed
    }

    /// Whether the field exists. Untracked.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.fields.read().contains_key(key)
    }

    /// Field names in insertion order. Untracked: enumerating does not
    /// register dependencies, only reads do.
    pub fn keys_untracked(&self) -> Vec<Arc<str>> {
        self.inner.fields.read().keys().cloned().collect()
    }

    /// Number of fields. Untracked.
    pub fn len(&self) -> usize {
        self.inner.fields.read().len()
    }

    /// Whether the object has no fields. Untracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark this container as never-to-be-observed. [`observe`] skips it.
    pub fn mark_raw(&self) {
        self.inner.raw.store(true, Ordering::SeqCst);
    }

    /// Whether this container carries the non-reactive marker.
    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::SeqCst)
    }

    /// Whether [`observe`] has processed this container.
    pub fn is_observed(&self) -> bool {
        self.inner.observed.load(Ordering::SeqCst)
    }

    /// How many times this container was installed as root state.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.load(Ordering::SeqCst)
    }

    pub(crate) fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    fn observe_container(&self) {
        if self.is_raw() {
            tracing::debug!("skipping observation of object marked non-reactive");
            return;
        }
        if self.inner.observed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cells: Vec<Arc<ReactiveCell>> = self.inner.fields.read().values().cloned().collect();
        for cell in cells {
            observe(&cell.get_untracked());
        }
    }

    fn bump_root_count(&self) {
        self.inner.root_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for ObservedObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObservedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedObject")
            .field("len", &self.len())
            .field("observed", &self.is_observed())
            .finish()
    }
}

/// An observed array container with intercepted mutating operations.
#[derive(Clone)]
pub struct ObservedArray {
    inner: Arc<ArrayInner>,
}

struct ArrayInner {
    items: RwLock<Vec<Value>>,
    dep: Dep,
    observed: AtomicBool,
    raw: AtomicBool,
    root_count: AtomicUsize,
}

impl ObservedArray {
    /// Create an array from elements. Observation state is off until
    /// [`observe`] runs.
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                items: RwLock::new(items),
                dep: Dep::new(),
                observed: AtomicBool::new(false),
                raw: AtomicBool::new(false),
                root_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Whether two handles refer to the same container.
    pub fn handle_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Element count, tracked through the structural dep.
    pub fn len(&self) -> usize {
        self.inner.dep.depend();
        self.inner.items.read().len()
    }

    /// Whether the array is empty. Tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one element, tracked through the structural dep (element access
    /// itself cannot be intercepted).
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.dep.depend();
        let item = self.inner.items.read().get(index).cloned();
        if context::is_tracking() {
            match &item {
                Some(Value::Object(obj)) if obj.is_observed() => obj.dep().depend(),
                Some(Value::Array(arr)) if arr.is_observed() => {
                    arr.dep().depend();
                    depend_array(arr);
                }
                _ => {}
            }
        }
        item
    }

    /// Copy of the elements, tracked through the structural dep and every
    /// observed element.
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.dep.depend();
        if context::is_tracking() {
            depend_array(self);
        }
        self.inner.items.read().clone()
    }

    /// Copy of the elements without registering dependencies.
    pub fn snapshot_untracked(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Append to the tail.
    pub fn push(&self, value: Value) {
        self.observe_inserted(std::slice::from_ref(&value));
        self.inner.items.write().push(value);
        self.inner.dep.notify();
    }

    /// Remove from the tail.
    pub fn pop(&self) -> Option<Value> {
        let removed = self.inner.items.write().pop();
        if removed.is_some() {
            self.inner.dep.notify();
        }
        removed
    }

    /// Remove from the head.
    pub fn shift(&self) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        if removed.is_some() {
            self.inner.dep.notify();
        }
        removed
    }

    /// Insert at the head.
    pub fn unshift(&self, value: Value) {
        self.observe_inserted(std::slice::from_ref(&value));
        self.inner.items.write().insert(0, value);
        self.inner.dep.notify();
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `inserts` in their place. Returns the removed elements. Out-of-range
    /// positions are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, inserts: Vec<Value>) -> Vec<Value> {
        self.observe_inserted(&inserts);
        let removed: Vec<Value> = {
            let mut items = self.inner.items.write();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, inserts).collect()
        };
        self.inner.dep.notify();
        removed
    }

    /// Reorder elements by the given comparison.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> std::cmp::Ordering) {
        self.inner.items.write().sort_by(compare);
        self.inner.dep.notify();
    }

    /// Reverse element order.
    pub fn reverse(&self) {
        self.inner.items.write().reverse();
        self.inner.dep.notify();
    }

    /// Write one element through the notification path. Growing writes pad
    /// the gap with `Null`.
    pub fn set_index(&self, index: usize, value: Value) {
        self.observe_inserted(std::slice::from_ref(&value));
        {
            let mut items = self.inner.items.write();
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
        }
        self.inner.dep.notify();
    }

    /// Remove one element through the notification path.
    pub fn remove_at(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.write();
            if index < items.len() {
                Some(items.remove(index))
            } else {
                None
            }
        };
        if removed.is_some() {
            self.inner.dep.notify();
        }
        removed
    }

    /// Mark this container as never-to-be-observed.
    pub fn mark_raw(&self) {
        self.inner.raw.store(true, Ordering::SeqCst);
    }

    /// Whether this container carries the non-reactive marker.
    pub fn is_raw(&self) -> bool {
        self.inner.raw.load(Ordering::SeqCst)
    }

    /// Whether [`observe`] has processed this container.
    pub fn is_observed(&self) -> bool {
        self.inner.observed.load(Ordering::SeqCst)
    }

    /// How many times this container was installed as root state.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.load(Ordering::SeqCst)
    }

    pub(crate) fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    fn observe_inserted(&self, values: &[Value]) {
        if self.is_observed() {
            for value in values {
                observe(value);
            }
        }
    }

    fn observe_container(&self) {
        if self.is_raw() {
            tracing::debug!("skipping observation of array marked non-reactive");
            return;
        }
        if self.inner.observed.swap(true, Ordering::SeqCst) {
            return;
        }
        for item in self.snapshot_untracked() {
            observe(&item);
        }
    }

    fn bump_root_count(&self) {
        self.inner.root_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ObservedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedArray")
            .field("len", &self.inner.items.read().len())
            .field("observed", &self.is_observed())
            .finish()
    }
}

/// Recursively activate tracking on a value's containers.
///
/// Idempotent; a no-op for primitives and for containers marked raw.
pub fn observe(value: &Value) {
    match value {
        Value::Object(obj) => obj.observe_container(),
        Value::Array(arr) => arr.observe_container(),
        _ => {}
    }
}

/// [`observe`], additionally counting the container as root state.
pub fn observe_root(value: &Value) {
    observe(value);
    match value {
        Value::Object(obj) if obj.is_observed() => obj.bump_root_count(),
        Value::Array(arr) if arr.is_observed() => arr.bump_root_count(),
        _ => {}
    }
}

/// Key addressing one entry of a container for [`set`] / [`remove`].
#[derive(Clone, Debug)]
pub enum EntryKey {
    /// An object field name.
    Field(Arc<str>),
    /// An array index.
    Index(usize),
}

impl From<&str> for EntryKey {
    fn from(s: &str) -> Self {
        EntryKey::Field(Arc::from(s))
    }
}

impl From<usize> for EntryKey {
    fn from(i: usize) -> Self {
        EntryKey::Index(i)
    }
}

/// Write one entry of a container through the notification path.
///
/// Returns false (with a diagnostic) when the key kind does not match the
/// container kind.
pub fn set(target: &Value, key: impl Into<EntryKey>, value: Value) -> bool {
    match (target, key.into()) {
        (Value::Object(obj), EntryKey::Field(name)) => {
            obj.set_field(name, value);
            true
        }
        (Value::Array(arr), EntryKey::Index(index)) => {
            arr.set_index(index, value);
            true
        }
        (_, key) => {
            tracing::warn!(?key, "set target is not a container matching the key kind");
            false
        }
    }
}

/// Remove one entry of a container through the notification path.
pub fn remove(target: &Value, key: impl Into<EntryKey>) -> Option<Value> {
    match (target, key.into()) {
        (Value::Object(obj), EntryKey::Field(name)) => obj.remove_field(&name),
        (Value::Array(arr), EntryKey::Index(index)) => arr.remove_at(index),
        (_, key) => {
            tracing::warn!(?key, "remove target is not a container matching the key kind");
            None
        }
    }
}
