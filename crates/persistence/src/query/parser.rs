//! Parser from the JSON filter DSL to the condition AST.
//!
//! A query is a JSON object mapping field names to either a scalar (shorthand
//! for `eq`) or an operator map (`{"gte": 10, "lt": 20}`). The reserved keys
//! `$and` and `$or` hold non-empty arrays of field maps.
//!
//! ```
//! use helios_dal::query::{parse, GroupKind};
//! use serde_json::json;
//!
//! let group = parse(&json!({
//!     "status": "open",
//!     "amount": {"between": [100, 500]},
//!     "$or": [{"priority": "high"}, {"escalated": true}]
//! }))
//! .unwrap();
//! assert_eq!(group.kind, GroupKind::And);
//! assert_eq!(group.members.len(), 3);
//! ```

use serde_json::{Map, Value};

use super::ast::{Condition, FieldCondition, Group, GroupKind, NestedSpec, Operand, Operator};
use crate::error::{DalError, DalResult, UnsupportedOperatorError, ValidationError};
use crate::types::FieldPath;

/// Parses a JSON query into a validated AND group.
///
/// Validation is complete when this returns: every operand has the shape its
/// operator needs, so compilation cannot fail on operand shape.
pub fn parse(query: &Value) -> DalResult<Group> {
    match query {
        Value::Object(map) => parse_field_map(map),
        Value::Null => Ok(Group::empty()),
        _ => Err(shape("query must be a JSON object")),
    }
}

fn shape(message: impl Into<String>) -> DalError {
    ValidationError::InvalidQueryShape {
        message: message.into(),
    }
    .into()
}

fn parse_field_map(map: &Map<String, Value>) -> DalResult<Group> {
    let mut members = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => members.push(Condition::Group(parse_logical(GroupKind::And, value)?)),
            "$or" => members.push(Condition::Group(parse_logical(GroupKind::Or, value)?)),
            k if k.starts_with('$') => {
                return Err(ValidationError::UnsupportedQueryOperator { key: k.to_string() }.into());
            }
            field => {
                let path = FieldPath::parse(field)?;
                members.extend(parse_field(&path, value, false)?.into_iter().map(Condition::Field));
            }
        }
    }
    Ok(Group::and(members))
}

fn parse_logical(kind: GroupKind, value: &Value) -> DalResult<Group> {
    let items = match value {
        Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(ValidationError::EmptyLogicalGroup {
                group: kind.key().to_string(),
            }
            .into());
        }
    };

    let mut members = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(map) = item else {
            return Err(shape(format!("{} members must be field maps", kind.key())));
        };
        if map.is_empty() {
            return Err(shape(format!("{} members must not be empty", kind.key())));
        }
        let mut group = parse_field_map(map)?;
        // A one-condition member stays flat; several conditions form an AND.
        if group.members.len() == 1 {
            members.extend(group.members.pop());
        } else {
            members.push(Condition::Group(group));
        }
    }
    Ok(Group { kind, members })
}

/// Parses the conditions of a single field (`{"gte": 1}` or a scalar).
pub(crate) fn parse_field_conditions(path: &FieldPath, value: &Value) -> DalResult<Vec<FieldCondition>> {
    parse_field(path, value, false)
}

fn parse_field(path: &FieldPath, value: &Value, nested: bool) -> DalResult<Vec<FieldCondition>> {
    let Value::Object(ops) = value else {
        return Ok(vec![build(path, Operator::Eq, value, nested)?]);
    };
    if ops.is_empty() {
        return Err(ValidationError::InvalidOperand {
            field: path.to_string(),
            operator: String::new(),
            message: "operator map must not be empty".to_string(),
        }
        .into());
    }

    ops.iter()
        .map(|(key, operand)| {
            let operator = Operator::parse(key)
                .ok_or_else(|| ValidationError::UnsupportedQueryOperator { key: key.clone() })?;
            build(path, operator, operand, nested)
        })
        .collect()
}

fn build(path: &FieldPath, operator: Operator, raw: &Value, nested: bool) -> DalResult<FieldCondition> {
    if nested && !operator.allowed_nested() {
        return Err(UnsupportedOperatorError::NestedKey {
            key: operator.as_str().to_string(),
        }
        .into());
    }
    let operand = operand_for(path, operator, raw)?;
    FieldCondition::new(path.clone(), operator, operand)
}

fn operand_error(path: &FieldPath, operator: Operator, message: &str) -> DalError {
    ValidationError::InvalidOperand {
        field: path.to_string(),
        operator: operator.as_str().to_string(),
        message: message.to_string(),
    }
    .into()
}

fn operand_for(path: &FieldPath, operator: Operator, raw: &Value) -> DalResult<Operand> {
    let operand = match operator {
        Operator::Between => match raw {
            Value::Array(bounds) if bounds.len() == 2 => Operand::Range {
                low: bounds[0].clone(),
                high: bounds[1].clone(),
            },
            _ => return Err(operand_error(path, operator, "expected [low, high]")),
        },
        Operator::In | Operator::Nin => match raw {
            Value::Array(values) => Operand::List(values.clone()),
            _ => return Err(operand_error(path, operator, "expected an array of candidates")),
        },
        Operator::Exists => match raw {
            Value::Bool(flag) => Operand::Flag(*flag),
            _ => return Err(operand_error(path, operator, "expected a boolean")),
        },
        Operator::ElemMatch => match raw.get("in") {
            Some(Value::Array(values)) if raw.as_object().is_some_and(|m| m.len() == 1) => {
                Operand::List(values.clone())
            }
            _ => return Err(operand_error(path, operator, "expected {\"in\": [...]}")),
        },
        Operator::NestedMatch => {
            let Value::Object(fields) = raw else {
                return Err(operand_error(path, operator, "expected a map of sub-fields"));
            };
            Operand::Nested(NestedSpec {
                index: None,
                conditions: parse_nested_fields(fields)?,
            })
        }
        Operator::NestedArrayMatch => {
            let index = raw
                .get("index")
                .and_then(Value::as_u64)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| operand_error(path, operator, "expected a non-negative \"index\""))?;
            let Some(Value::Object(fields)) = raw.get("match") else {
                return Err(operand_error(path, operator, "expected a \"match\" map of sub-fields"));
            };
            Operand::Nested(NestedSpec {
                index: Some(index),
                conditions: parse_nested_fields(fields)?,
            })
        }
        _ => Operand::Value(raw.clone()),
    };
    Ok(operand)
}

fn parse_nested_fields(fields: &Map<String, Value>) -> DalResult<Vec<FieldCondition>> {
    let mut conditions = Vec::new();
    for (sub_field, value) in fields {
        if sub_field.starts_with('$') {
            return Err(UnsupportedOperatorError::NestedKey {
                key: sub_field.clone(),
            }
            .into());
        }
        let path = FieldPath::parse(sub_field)?;
        conditions.extend(parse_field(&path, value, true)?);
    }
    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn only_field(group: &Group) -> &FieldCondition {
        match group.members.as_slice() {
            [Condition::Field(field)] => field,
            other => panic!("expected one field condition, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_is_eq_shorthand() {
        let group = parse(&json!({"status": "open"})).unwrap();
        let field = only_field(&group);
        assert_eq!(field.operator(), Operator::Eq);
        assert_eq!(field.operand(), &Operand::Value(json!("open")));
    }

    #[test]
    fn test_multiple_operators_on_one_field() {
        let group = parse(&json!({"amount": {"gte": 10, "lt": 20}})).unwrap();
        assert_eq!(group.kind, GroupKind::And);
        assert_eq!(group.members.len(), 2);
    }

    #[test]
    fn test_unknown_operator_names_the_key() {
        let err = parse(&json!({"location": {"near": [1, 2]}})).unwrap_err();
        assert_eq!(err.to_string(), "unsupported query operator: near");

        let err = parse(&json!({"$nor": []})).unwrap_err();
        assert_eq!(err.to_string(), "unsupported query operator: $nor");
    }

    #[test]
    fn test_logical_groups() {
        let group = parse(&json!({
            "$or": [{"a": 1}, {"b": 2, "c": 3}]
        }))
        .unwrap();
        let Condition::Group(or) = &group.members[0] else {
            panic!("expected a group");
        };
        assert_eq!(or.kind, GroupKind::Or);
        assert!(matches!(or.members[0], Condition::Field(_)));
        assert!(matches!(&or.members[1], Condition::Group(g) if g.kind == GroupKind::And));
    }

    #[test]
    fn test_empty_logical_group_is_rejected() {
        for query in [json!({"$or": []}), json!({"$and": {}}), json!({"$or": [{}]})] {
            assert!(parse(&query).is_err(), "query {}", query);
        }
    }

    #[test]
    fn test_between_requires_two_bounds() {
        assert!(parse(&json!({"amount": {"between": [1]}})).is_err());
        assert!(parse(&json!({"amount": {"between": [1, 2, 3]}})).is_err());
        assert!(parse(&json!({"amount": {"between": 5}})).is_err());
    }

    #[test]
    fn test_in_with_scalar_operand_fails() {
        assert!(parse(&json!({"status": {"in": "open"}})).is_err());
        assert!(parse(&json!({"status": {"in": []}})).is_err());
    }

    #[test]
    fn test_nested_match() {
        let group = parse(&json!({
            "address": {"nestedMatch": {"city": "Oslo", "zip": {"beginsWith": "01"}}}
        }))
        .unwrap();
        let field = only_field(&group);
        let Operand::Nested(nested) = field.operand() else {
            panic!("expected nested operand");
        };
        assert_eq!(nested.index, None);
        assert_eq!(nested.conditions.len(), 2);
    }

    #[test]
    fn test_nested_array_match() {
        let group = parse(&json!({
            "items": {"nestedArrayMatch": {"index": 0, "match": {"sku": {"in": ["A", "B"]}}}}
        }))
        .unwrap();
        let Operand::Nested(nested) = only_field(&group).operand() else {
            panic!("expected nested operand");
        };
        assert_eq!(nested.index, Some(0));
    }

    #[test]
    fn test_nested_rejects_unsupported_keys() {
        let err = parse(&json!({
            "address": {"nestedMatch": {"tags": {"elemMatch": {"in": ["x"]}}}}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "nested query key not supported: elemMatch");

        let err = parse(&json!({
            "address": {"nestedMatch": {"city": {"notContains": "x"}}}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "nested query key not supported: notContains");
    }

    #[test]
    fn test_elem_match_shape() {
        assert!(parse(&json!({"tags": {"elemMatch": {"in": ["a", "b"]}}})).is_ok());
        assert!(parse(&json!({"tags": {"elemMatch": ["a"]}})).is_err());
        assert!(parse(&json!({"tags": {"elemMatch": {"in": ["a"], "eq": "b"}}})).is_err());
    }

    #[test]
    fn test_exists_requires_boolean() {
        assert!(parse(&json!({"x": {"exists": true}})).is_ok());
        assert!(parse(&json!({"x": {"exists": 1}})).is_err());
    }

    #[test]
    fn test_non_object_query_is_rejected() {
        assert!(parse(&json!([1, 2])).is_err());
        assert!(parse(&Value::Null).unwrap().is_empty());
    }
}
