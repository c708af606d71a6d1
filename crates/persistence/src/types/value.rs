//! Plain value model helpers.
//!
//! Records are JSON objects ([`Record`]). These helpers give every component
//! (AST evaluator, emulator, post-filters) the same answer to "what is at this
//! path" and "how do two values order".

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::path::{FieldPath, PathSegment};

/// A stored record in the plain value model.
pub type Record = Map<String, Value>;

/// The scalar kind of a value, used for operand homogeneity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON boolean.
    Bool,
    /// JSON null.
    Null,
}

/// Returns the scalar kind of `value`, or `None` for arrays and objects.
pub fn scalar_kind(value: &Value) -> Option<ScalarKind> {
    match value {
        Value::String(_) => Some(ScalarKind::String),
        Value::Number(_) => Some(ScalarKind::Number),
        Value::Bool(_) => Some(ScalarKind::Bool),
        Value::Null => Some(ScalarKind::Null),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Resolves `path` inside a record.
pub fn lookup<'a>(record: &'a Record, path: &FieldPath) -> Option<&'a Value> {
    let mut segments = path.segments().iter();
    let mut current = match segments.next()? {
        PathSegment::Key(name) => record.get(name)?,
        PathSegment::Index(_) => return None,
    };
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(name), Value::Object(map)) => map.get(name)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i as usize)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Orders two values. Numbers compare numerically, strings lexicographically,
/// booleans and nulls only by equality; mixed kinds are incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

/// Returns `true` if the two values are equal under [`compare_values`].
pub fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal)
}

/// Copies the value at `path` from `source` into `target`, creating intermediate objects.
///
/// Only object-member paths are supported; index segments are ignored.
pub fn copy_path(source: &Record, target: &mut Record, path: &FieldPath) {
    let Some(value) = lookup(source, path) else {
        return;
    };
    let keys: Vec<&str> = path
        .segments()
        .iter()
        .filter_map(|segment| match segment {
            PathSegment::Key(name) => Some(name.as_str()),
            PathSegment::Index(_) => None,
        })
        .collect();
    if keys.len() != path.segments().len() || keys.is_empty() {
        return;
    }
    insert_nested(target, &keys, value.clone());
}

fn insert_nested(target: &mut Record, keys: &[&str], value: Value) {
    if keys.len() == 1 {
        target.insert(keys[0].to_string(), value);
        return;
    }
    let entry = target
        .entry(keys[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_nested(child, &keys[1..], value);
    }
}

/// Builds a new record containing only the given paths.
pub fn project(record: &Record, paths: &[FieldPath]) -> Record {
    let mut projected = Record::new();
    for path in paths {
        copy_path(record, &mut projected, path);
    }
    projected
}
