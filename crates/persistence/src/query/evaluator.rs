//! In-process evaluation of condition groups against records.
//!
//! Used for post-filters on batch reads and as the reference semantics the
//! compiled dialects are held to. Missing fields make comparisons, ranges,
//! prefix, substring and membership tests false; `ne`, `nin` and
//! `notContains` are true on a missing field.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{Condition, FieldCondition, Group, GroupKind, Operand, Operator};
use crate::types::FieldPath;
use crate::types::value::{Record, compare_values, lookup, values_equal};

/// Returns `true` if `record` satisfies `group`.
pub fn matches(group: &Group, record: &Record) -> bool {
    match group.kind {
        GroupKind::And => group.members.iter().all(|m| matches_condition(m, record)),
        GroupKind::Or => group.members.iter().any(|m| matches_condition(m, record)),
    }
}

fn matches_condition(condition: &Condition, record: &Record) -> bool {
    match condition {
        Condition::Field(field) => matches_field(field, None, record),
        Condition::Group(group) => matches(group, record),
    }
}

fn matches_field(condition: &FieldCondition, base: Option<&FieldPath>, record: &Record) -> bool {
    let path = match base {
        Some(base) => base.join(condition.field()),
        None => condition.field().clone(),
    };
    let actual = lookup(record, &path);

    match (condition.operator(), condition.operand()) {
        (Operator::Eq, Operand::Value(expected)) => actual.is_some_and(|v| values_equal(v, expected)),
        (Operator::Ne, Operand::Value(expected)) => !actual.is_some_and(|v| values_equal(v, expected)),
        (Operator::Lt, Operand::Value(bound)) => ordered(actual, bound, |o| o == Ordering::Less),
        (Operator::Lte, Operand::Value(bound)) => ordered(actual, bound, |o| o != Ordering::Greater),
        (Operator::Gt, Operand::Value(bound)) => ordered(actual, bound, |o| o == Ordering::Greater),
        (Operator::Gte, Operand::Value(bound)) => ordered(actual, bound, |o| o != Ordering::Less),
        (Operator::Between, Operand::Range { low, high }) => {
            ordered(actual, low, |o| o != Ordering::Less) && ordered(actual, high, |o| o != Ordering::Greater)
        }
        (Operator::BeginsWith, Operand::Value(Value::String(prefix))) => {
            actual.and_then(Value::as_str).is_some_and(|s| s.starts_with(prefix.as_str()))
        }
        (Operator::Contains, Operand::Value(Value::String(needle))) => contains(actual, needle),
        (Operator::NotContains, Operand::Value(Value::String(needle))) => !contains(actual, needle),
        (Operator::In, Operand::List(candidates)) => {
            actual.is_some_and(|v| candidates.iter().any(|c| values_equal(v, c)))
        }
        (Operator::Nin, Operand::List(candidates)) => {
            !actual.is_some_and(|v| candidates.iter().any(|c| values_equal(v, c)))
        }
        (Operator::Exists, Operand::Flag(flag)) => actual.is_some() == *flag,
        (Operator::ElemMatch, Operand::List(candidates)) => match actual {
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| candidates.iter().any(|c| values_equal(item, c))),
            _ => false,
        },
        (Operator::NestedMatch | Operator::NestedArrayMatch, Operand::Nested(nested)) => {
            let base = match nested.index {
                Some(index) => path.with_index(index),
                None => path,
            };
            nested.conditions
                .iter()
                .all(|sub| matches_field(sub, Some(&base), record))
        }
        // Unreachable for conditions built through FieldCondition::new.
        _ => false,
    }
}

fn ordered(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual.and_then(|v| compare_values(v, bound)).is_some_and(accept)
}

fn contains(actual: Option<&Value>, needle: &str) -> bool {
    actual.and_then(Value::as_str).is_some_and(|s| s.contains(needle))
}
