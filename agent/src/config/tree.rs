//! Recursive key search over configuration trees
//!
//! Device configuration documents nest the same setting at different depths
//! depending on the firmware revision, so values are located by key rather
//! than by fixed path. Search is depth-first over object-valued children in
//! document order; the first match wins and later siblings are never
//! visited. This relies on serde_json's `preserve_order` feature.

use serde_json::{Map, Value};

/// Find the path to `key` inside `tree`.
///
/// A direct child match at any level returns immediately; otherwise each
/// object-valued child is searched in document order. Returns the full key
/// path from the root down to (and including) `key`.
pub fn find_path(key: &str, tree: &Map<String, Value>) -> Option<Vec<String>> {
    if tree.contains_key(key) {
        return Some(vec![key.to_string()]);
    }

    for (child_key, child) in tree {
        if let Value::Object(child_map) = child {
            if let Some(mut path) = find_path(key, child_map) {
                path.insert(0, child_key.clone());
                return Some(path);
            }
        }
    }

    None
}

/// Get the value stored under `key`, wherever it nests
pub fn get_value<'a>(key: &str, tree: &'a Map<String, Value>) -> Option<&'a Value> {
    let path = find_path(key, tree)?;

    let mut current = tree;
    for step in &path[..path.len() - 1] {
        current = current.get(step)?.as_object()?;
    }
    current.get(key)
}

/// Replace the value stored under `key`, wherever it nests.
///
/// Update-in-place only: returns false and leaves the tree untouched when
/// the key does not exist. Keys can never be introduced through this
/// interface; the schema is fixed by whatever document was loaded.
pub fn set_value(key: &str, value: Value, tree: &mut Map<String, Value>) -> bool {
    let Some(path) = find_path(key, tree) else {
        return false;
    };

    let mut current = tree;
    for step in &path[..path.len() - 1] {
        match current.get_mut(step).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current.insert(key.to_string(), value);
    true
}

/// Normalize a scalar value to its string form
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
