//! Diff generation for audit logging
//!
//! Compares a before and an after state and produces a flat map from escaped
//! dot-path to `{old, new}`. Nested objects and arrays are walked; array
//! indices become path segments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path;

/// Before/after pair for one path; `null` on the side where it is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Escaped dot-path to change
pub type DiffMap = BTreeMap<String, FieldChange>;

/// Generate the diff between two states
///
/// `None` and non-object inputs count as empty objects.
pub fn diff(old: Option<&Value>, new: Option<&Value>) -> DiffMap {
    let empty = Map::new();
    let old = old.and_then(Value::as_object).unwrap_or(&empty);
    let new = new.and_then(Value::as_object).unwrap_or(&empty);
    diff_maps(old, new)
}

/// Generate the diff between two rows
pub fn diff_maps(old: &Map<String, Value>, new: &Map<String, Value>) -> DiffMap {
    let mut out = DiffMap::new();
    let mut prefix = Vec::new();
    walk_objects(old, new, &mut prefix, &mut out);
    out
}

/// Convert a diff into the JSON content stored on an UPDATE record
pub fn into_content(diff: DiffMap) -> Map<String, Value> {
    diff.into_iter()
        .map(|(path, change)| {
            let mut entry = Map::new();
            entry.insert("old".into(), change.old);
            entry.insert("new".into(), change.new);
            (path, Value::Object(entry))
        })
        .collect()
}

fn walk_objects(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    prefix: &mut Vec<String>,
    out: &mut DiffMap,
) {
    for (key, old_val) in old {
        prefix.push(key.clone());
        match new.get(key) {
            Some(new_val) => walk_values(old_val, new_val, prefix, out),
            None => record(prefix, old_val.clone(), Value::Null, out),
        }
        prefix.pop();
    }

    for (key, new_val) in new {
        if !old.contains_key(key) {
            prefix.push(key.clone());
            record(prefix, Value::Null, new_val.clone(), out);
            prefix.pop();
        }
    }
}

fn walk_values(old: &Value, new: &Value, prefix: &mut Vec<String>, out: &mut DiffMap) {
    match (old, new) {
        (Value::Object(o), Value::Object(n)) => walk_objects(o, n, prefix, out),
        (Value::Array(o), Value::Array(n)) => {
            for i in 0..o.len().max(n.len()) {
                prefix.push(i.to_string());
                match (o.get(i), n.get(i)) {
                    (Some(a), Some(b)) => walk_values(a, b, prefix, out),
                    (Some(a), None) => record(prefix, a.clone(), Value::Null, out),
                    (None, Some(b)) => record(prefix, Value::Null, b.clone(), out),
                    (None, None) => {}
                }
                prefix.pop();
            }
        }
        _ => {
            if old != new {
                record(prefix, old.clone(), new.clone(), out);
            }
        }
    }
}

fn record(prefix: &[String], old: Value, new: Value, out: &mut DiffMap) {
    out.insert(path::escape(prefix), FieldChange { old, new });
}

/// Format a JSON value for human-readable display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            // Truncate long strings
            if s.chars().count() > 50 {
                let head: String = s.chars().take(47).collect();
                format!("\"{}...\"", head)
            } else {
                format!("\"{}\"", s)
            }
        }
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
