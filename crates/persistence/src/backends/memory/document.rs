//! Evaluator for operator documents of the document dialect.
//!
//! Supports `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`,
//! `$exists`, `$regex` (with `$options`), `$not`, `$elemMatch`, and the
//! logical `$and` / `$or`. Field keys are dotted paths; numeric segments
//! index into arrays.
//!
//! `$ne`, `$nin` and `$not` match documents where the field is absent.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::types::value::{Record, compare_values, values_equal};

/// Errors produced while evaluating a filter document.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DocumentError {
    /// An operator the evaluator does not support.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// An operator with an operand of the wrong shape.
    #[error("bad operand for {operator}: {message}")]
    BadOperand { operator: String, message: String },

    /// A `$regex` pattern that does not compile.
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

fn bad(operator: &str, message: &str) -> DocumentError {
    DocumentError::BadOperand {
        operator: operator.to_string(),
        message: message.to_string(),
    }
}

/// Returns `true` if `record` satisfies the filter document.
pub(crate) fn matches_document(filter: &Value, record: &Record) -> Result<bool, DocumentError> {
    let Value::Object(clauses) = filter else {
        return Err(bad("filter", "expected an object"));
    };
    for (key, condition) in clauses {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for member in members(key, condition)? {
                    all &= matches_document(member, record)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for member in members(key, condition)? {
                    any |= matches_document(member, record)?;
                }
                any
            }
            op if op.starts_with('$') => return Err(DocumentError::UnknownOperator(op.to_string())),
            field => matches_field(resolve_dotted(record, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn members<'a>(key: &str, condition: &'a Value) -> Result<&'a [Value], DocumentError> {
    match condition {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(bad(key, "expected a non-empty array")),
    }
}

/// Resolves a dotted path. Numeric segments index arrays.
pub(crate) fn resolve_dotted<'a>(record: &'a Record, dotted: &str) -> Option<&'a Value> {
    let mut parts = dotted.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_doc(condition: &Value) -> Option<&Map<String, Value>> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn matches_field(actual: Option<&Value>, condition: &Value) -> Result<bool, DocumentError> {
    let Some(ops) = is_operator_doc(condition) else {
        return Ok(actual.is_some_and(|v| values_equal(v, condition)));
    };

    let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => actual.is_some_and(|v| values_equal(v, operand)),
            "$ne" => !actual.is_some_and(|v| values_equal(v, operand)),
            "$gt" => ordered(actual, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(actual, operand, |o| o != Ordering::Less),
            "$lt" => ordered(actual, operand, |o| o == Ordering::Less),
            "$lte" => ordered(actual, operand, |o| o != Ordering::Greater),
            "$in" => {
                let list = list(op, operand)?;
                actual.is_some_and(|v| list.iter().any(|c| values_equal(v, c)))
            }
            "$nin" => {
                let list = list(op, operand)?;
                !actual.is_some_and(|v| list.iter().any(|c| values_equal(v, c)))
            }
            "$exists" => {
                let flag = operand.as_bool().ok_or_else(|| bad(op, "expected a boolean"))?;
                actual.is_some() == flag
            }
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| bad(op, "expected a string"))?;
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .build()?;
                actual.and_then(Value::as_str).is_some_and(|s| regex.is_match(s))
            }
            "$options" => true,
            "$not" => !matches_field(actual, operand)?,
            "$elemMatch" => match actual {
                Some(Value::Array(items)) => {
                    let mut any = false;
                    for item in items {
                        any |= matches_field(Some(item), operand)?;
                    }
                    any
                }
                _ => false,
            },
            other => return Err(DocumentError::UnknownOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn ordered(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual.and_then(|v| compare_values(v, bound)).is_some_and(accept)
}

fn list<'a>(op: &str, operand: &'a Value) -> Result<&'a [Value], DocumentError> {
    operand
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| bad(op, "expected an array"))
}
