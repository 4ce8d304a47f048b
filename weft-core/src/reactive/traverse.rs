//! Deep Dependency Traversal
//!
//! A deep watcher must re-run when anything reachable from its value
//! changes, so after each computation the result is walked and every field
//! and element is read inside the watcher's tracking scope. Containers are
//! de-duplicated by structural dep id, which also guards against reference
//! cycles. Depth is bounded; state nested beyond the ceiling is not a
//! realistic shape and is silently left untracked.

use std::collections::HashSet;

use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Touch every reachable property of `value` so nested dependencies are
/// registered on the current watcher.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen, 0);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<u64>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(obj) => {
            if !seen.insert(obj.dep().id()) {
                return;
            }
            obj.dep().depend();
            for key in obj.keys_untracked() {
                if let Some(field) = obj.get(&key) {
                    traverse_inner(&field, seen, depth + 1);
                }
            }
        }
        Value::Array(arr) => {
            if !seen.insert(arr.dep().id()) {
                return;
            }
            for item in arr.snapshot() {
                traverse_inner(&item, seen, depth + 1);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observer::observe;
    use serde_json::json;

    #[test]
    fn traverse_handles_cycles() {
        let value = Value::from(json!({ "name": "outer" }));
        observe(&value);
        let obj = value.as_object().unwrap();
        // self-reference
        obj.set_field("me", value.clone());
        traverse(&value);
    }

    #[test]
    fn traverse_outside_a_watcher_registers_nothing() {
        let value = Value::from(json!({ "a": [1, { "b": 2 }] }));
        observe(&value);
        traverse(&value);
        assert_eq!(value.as_object().unwrap().dep().subscriber_count(), 0);
    }
}
