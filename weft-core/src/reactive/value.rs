//! Dynamic Value Model
//!
//! The reactive layer operates on a tagged-variant value representation
//! rather than on arbitrary host types. A `Value` is either a primitive or a
//! handle to an observed container; container handles are cheap to clone and
//! share state, following the same handle-clone pattern the rest of the
//! runtime uses.
//!
//! # Change Detection
//!
//! Writes are skipped when the new value is "the same" as the stored one.
//! Sameness here is deliberately shallow:
//!
//! - primitives compare by value, with `NaN == NaN` counting as unchanged,
//! - container handles compare by identity, never by contents.
//!
//! The identity rule is conservative: a freshly built container always
//! re-triggers dependents even when it is shape-identical to the old one.
//! Avoiding a deep-equality walk on every write is the point.

use std::sync::Arc;

use super::observer::{ObservedArray, ObservedObject};

/// A dynamic value flowing through the reactive system.
#[derive(Clone, Debug)]
pub enum Value {
    /// The absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A handle to an observed object container.
    Object(ObservedObject),
    /// A handle to an observed array container.
    Array(ObservedArray),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// True for object and array handles.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// The object handle, if this is an object.
    pub fn as_object(&self) -> Option<&ObservedObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array handle, if this is an array.
    pub fn as_array(&self) -> Option<&ObservedArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a plain JSON value, without registering dependencies.
    ///
    /// Container contents are read untracked; a float that JSON cannot
    /// represent (NaN, infinities) becomes `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(o) => {
                let mut map = serde_json::Map::new();
                for key in o.keys_untracked() {
                    if let Some(v) = o.get_untracked(&key) {
                        map.insert(key.to_string(), v.to_json());
                    }
                }
                serde_json::Value::Object(map)
            }
            Value::Array(a) => {
                serde_json::Value::Array(a.snapshot_untracked().iter().map(Value::to_json).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    /// Convert plain JSON into the reactive value model.
    ///
    /// Containers are created unobserved; pass the result through
    /// [`observe`](super::observer::observe) to activate tracking.
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::Array(ObservedArray::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(ObservedObject::from_entries(
                map.into_iter().map(|(k, v)| (Arc::<str>::from(k.as_str()), Value::from(v))),
            )),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

/// Shallow, NaN-aware sameness used for "skip update" checks.
///
/// Returns true when a write of `b` over `a` should be treated as a no-op.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.handle_eq(y),
        (Value::Array(x), Value::Array(y)) => x.handle_eq(y),
        _ => false,
    }
}

/// A primitive child key used by the keyed reconciliation algorithm.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// An integer key.
    Int(i64),
    /// A string key.
    Str(Arc<str>),
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Arc::from(s.as_str()))
    }
}
