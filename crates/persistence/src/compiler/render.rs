//! Shared infix rendering for the expression, selector and statement dialects.
//!
//! The three SQL-like dialects agree on operator meaning and on boolean
//! structure; they differ in how fields, parameters and a handful of
//! functions are spelled. Each dialect implements [`InfixSyntax`] and
//! [`render_clause`] does the rest.
//!
//! Negations are guarded so that a missing field satisfies them on every
//! target: `ne` renders as `(<missing> OR f <> v)`.

use serde_json::Value;

use crate::error::{DalResult, ValidationError};
use crate::query::{Condition, FieldCondition, Group, GroupKind, Operand, Operator};
use crate::types::FieldPath;

/// Dialect-specific spelling of the infix grammar.
pub(crate) trait InfixSyntax {
    /// Renders a field reference.
    fn field(&mut self, path: &FieldPath) -> String;
    /// Binds a literal and returns its placeholder.
    fn param(&mut self, value: &Value) -> String;
    /// The inequality operator.
    fn not_equal(&self) -> &'static str;
    /// Presence test.
    fn defined(&self, field: &str) -> String;
    /// Absence test.
    fn missing(&self, field: &str) -> String;
    /// Case-sensitive prefix test.
    fn begins_with(&self, field: &str, param: &str) -> String;
    /// Substring test.
    fn contains(&self, field: &str, param: &str) -> String;
    /// Array membership test.
    fn array_contains(&self, field: &str, param: &str) -> String;
    /// Set membership.
    fn in_list(&self, field: &str, params: &[String]) -> String;
}

/// Renders a group as a fragment that can be safely joined with `AND`.
pub(crate) fn render_clause<S: InfixSyntax>(syntax: &mut S, group: &Group) -> DalResult<Option<String>> {
    let parts = render_parts(syntax, group)?;
    Ok(match (group.kind, parts.len()) {
        (_, 0) => None,
        (GroupKind::Or, n) if n > 1 => Some(format!("({})", parts.join(" OR "))),
        (_, _) => Some(parts.join(" AND ")),
    })
}

fn render_parts<S: InfixSyntax>(syntax: &mut S, group: &Group) -> DalResult<Vec<String>> {
    let mut parts = Vec::with_capacity(group.members.len());
    for member in &group.members {
        match member {
            Condition::Field(condition) => parts.push(render_condition(syntax, condition, None)?),
            Condition::Group(inner) => {
                let inner_parts = render_parts(syntax, inner)?;
                let separator = match inner.kind {
                    GroupKind::And => " AND ",
                    GroupKind::Or => " OR ",
                };
                match inner_parts.len() {
                    0 => {}
                    1 => parts.extend(inner_parts),
                    _ => parts.push(format!("({})", inner_parts.join(separator))),
                }
            }
        }
    }
    Ok(parts)
}

/// Renders one field condition, resolving its path against `base`.
pub(crate) fn render_condition<S: InfixSyntax>(
    syntax: &mut S,
    condition: &FieldCondition,
    base: Option<&FieldPath>,
) -> DalResult<String> {
    let path = match base {
        Some(base) => base.join(condition.field()),
        None => condition.field().clone(),
    };
    let field = syntax.field(&path);

    let rendered = match (condition.operator(), condition.operand()) {
        (Operator::Eq, Operand::Value(v)) => format!("{} = {}", field, syntax.param(v)),
        (Operator::Ne, Operand::Value(v)) => {
            let test = format!("{} {} {}", field, syntax.not_equal(), syntax.param(v));
            guard(syntax, &field, test)
        }
        (Operator::Lt, Operand::Value(v)) => format!("{} < {}", field, syntax.param(v)),
        (Operator::Lte, Operand::Value(v)) => format!("{} <= {}", field, syntax.param(v)),
        (Operator::Gt, Operand::Value(v)) => format!("{} > {}", field, syntax.param(v)),
        (Operator::Gte, Operand::Value(v)) => format!("{} >= {}", field, syntax.param(v)),
        (Operator::Between, Operand::Range { low, high }) => {
            let low = syntax.param(low);
            let high = syntax.param(high);
            format!("{} BETWEEN {} AND {}", field, low, high)
        }
        (Operator::BeginsWith, Operand::Value(v)) => {
            let p = syntax.param(v);
            syntax.begins_with(&field, &p)
        }
        (Operator::Contains, Operand::Value(v)) => {
            let p = syntax.param(v);
            syntax.contains(&field, &p)
        }
        (Operator::NotContains, Operand::Value(v)) => {
            let p = syntax.param(v);
            let test = format!("NOT {}", syntax.contains(&field, &p));
            guard(syntax, &field, test)
        }
        (Operator::In, Operand::List(values)) => {
            let params: Vec<String> = values.iter().map(|v| syntax.param(v)).collect();
            syntax.in_list(&field, &params)
        }
        (Operator::Nin, Operand::List(values)) if values.len() == 1 => {
            let test = format!("{} {} {}", field, syntax.not_equal(), syntax.param(&values[0]));
            guard(syntax, &field, test)
        }
        (Operator::Nin, Operand::List(values)) => {
            let params: Vec<String> = values.iter().map(|v| syntax.param(v)).collect();
            let test = format!("NOT ({})", syntax.in_list(&field, &params));
            guard(syntax, &field, test)
        }
        (Operator::Exists, Operand::Flag(true)) => syntax.defined(&field),
        (Operator::Exists, Operand::Flag(false)) => syntax.missing(&field),
        (Operator::ElemMatch, Operand::List(values)) => {
            let tests: Vec<String> = values
                .iter()
                .map(|v| {
                    let p = syntax.param(v);
                    syntax.array_contains(&field, &p)
                })
                .collect();
            wrap(tests, " OR ")
        }
        (Operator::NestedMatch | Operator::NestedArrayMatch, Operand::Nested(spec)) => {
            let base = match spec.index {
                Some(index) => path.with_index(index),
                None => path,
            };
            let tests = spec
                .conditions
                .iter()
                .map(|sub| render_condition(syntax, sub, Some(&base)))
                .collect::<DalResult<Vec<_>>>()?;
            wrap(tests, " AND ")
        }
        (operator, _) => {
            return Err(ValidationError::InvalidOperand {
                field: condition.field().to_string(),
                operator: operator.as_str().to_string(),
                message: "operand has the wrong shape".to_string(),
            }
            .into());
        }
    };
    Ok(rendered)
}

fn guard<S: InfixSyntax>(syntax: &S, field: &str, test: String) -> String {
    format!("({} OR {})", syntax.missing(field), test)
}

fn wrap(parts: Vec<String>, separator: &str) -> String {
    if parts.len() == 1 {
        parts.into_iter().collect()
    } else {
        format!("({})", parts.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;
    use serde_json::json;

    /// Minimal syntax with readable output.
    struct Plain(Vec<Value>);

    impl InfixSyntax for Plain {
        fn field(&mut self, path: &FieldPath) -> String {
            path.to_string()
        }
        fn param(&mut self, value: &Value) -> String {
            self.0.push(value.clone());
            format!("${}", self.0.len())
        }
        fn not_equal(&self) -> &'static str {
            "<>"
        }
        fn defined(&self, field: &str) -> String {
            format!("defined({})", field)
        }
        fn missing(&self, field: &str) -> String {
            format!("missing({})", field)
        }
        fn begins_with(&self, field: &str, param: &str) -> String {
            format!("prefix({}, {})", field, param)
        }
        fn contains(&self, field: &str, param: &str) -> String {
            format!("has({}, {})", field, param)
        }
        fn array_contains(&self, field: &str, param: &str) -> String {
            format!("elem({}, {})", field, param)
        }
        fn in_list(&self, field: &str, params: &[String]) -> String {
            format!("{} IN ({})", field, params.join(", "))
        }
    }

    fn render(query: Value) -> String {
        render_clause(&mut Plain(Vec::new()), &parse(&query).unwrap())
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn test_flat_or_and_multi_field_members() {
        assert_eq!(
            render(json!({"$or": [{"a": 1}, {"b": 2}]})),
            "(a = $1 OR b = $2)"
        );
        assert_eq!(
            render(json!({"$or": [{"a": 1}, {"b": 2, "c": 3}]})),
            "(a = $1 OR (b = $2 AND c = $3))"
        );
    }

    #[test]
    fn test_negations_are_guarded() {
        assert_eq!(render(json!({"a": {"ne": 1}})), "(missing(a) OR a <> $1)");
        assert_eq!(render(json!({"a": {"nin": [1]}})), "(missing(a) OR a <> $1)");
        assert_eq!(
            render(json!({"a": {"nin": [1, 2]}})),
            "(missing(a) OR NOT (a IN ($1, $2)))"
        );
        assert_eq!(
            render(json!({"a": {"notContains": "x"}})),
            "(missing(a) OR NOT has(a, $1))"
        );
    }

    #[test]
    fn test_elem_match_is_or_of_contains() {
        assert_eq!(
            render(json!({"tags": {"elemMatch": {"in": ["x", "y"]}}})),
            "(elem(tags, $1) OR elem(tags, $2))"
        );
        assert_eq!(render(json!({"tags": {"elemMatch": {"in": ["x"]}}})), "elem(tags, $1)");
    }

    #[test]
    fn test_nested_paths() {
        assert_eq!(
            render(json!({"items": {"nestedArrayMatch": {"index": 1, "match": {"sku": "A", "qty": {"gt": 1}}}}})),
            "(items[1].qty > $1 AND items[1].sku = $2)"
        );
    }

    #[test]
    fn test_between_and_exists() {
        assert_eq!(
            render(json!({"amount": {"between": [100, 500]}, "x": {"exists": false}})),
            "amount BETWEEN $1 AND $2 AND missing(x)"
        );
    }

    #[test]
    fn test_empty_group_renders_nothing() {
        assert!(render_clause(&mut Plain(Vec::new()), &Group::empty()).unwrap().is_none());
    }
}
