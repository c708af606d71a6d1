//! Selector dialect compiler.
//!
//! Produces a parameterised selector over the container alias `c`:
//!
//! ```text
//! SELECT * FROM c WHERE c["status"] = @p0 AND c["amount"] BETWEEN @p1 AND @p2 ORDER BY c["createdAt"] ASC
//! ```
//!
//! When the index is keyed on the container's partition key the partition
//! value is also returned separately so the query can be routed to a single
//! partition.

use serde::Serialize;
use serde_json::Value;

use super::render::{InfixSyntax, render_clause, render_condition};
use super::{CompiledFilter, Dialect, FilterCompiler, NativeFilter, QueryPlan};
use crate::error::DalResult;
use crate::query::{Operand, Operator};
use crate::types::{FieldPath, PathSegment};

/// A named selector parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorParameter {
    /// Parameter name including the `@` sigil.
    pub name: String,
    /// Bound value.
    pub value: Value,
}

/// A compiled selector-dialect request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorQuery {
    /// Selector text.
    pub query: String,
    /// Bound parameters, in order of appearance.
    pub parameters: Vec<SelectorParameter>,
    /// Partition key value for single-partition routing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<Value>,
}

#[derive(Default)]
struct SelectorSyntax {
    parameters: Vec<SelectorParameter>,
}

/// Renders a path over the container alias (`c["items"][0]["sku"]`).
pub(crate) fn selector_path(path: &FieldPath) -> String {
    let mut rendered = String::from("c");
    for segment in path.segments() {
        match segment {
            PathSegment::Key(name) => {
                let quoted = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name));
                rendered.push_str(&format!("[{}]", quoted));
            }
            PathSegment::Index(i) => rendered.push_str(&format!("[{}]", i)),
        }
    }
    rendered
}

impl InfixSyntax for SelectorSyntax {
    fn field(&mut self, path: &FieldPath) -> String {
        selector_path(path)
    }

    fn param(&mut self, value: &Value) -> String {
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push(SelectorParameter {
            name: name.clone(),
            value: value.clone(),
        });
        name
    }

    fn not_equal(&self) -> &'static str {
        "!="
    }

    fn defined(&self, field: &str) -> String {
        format!("IS_DEFINED({})", field)
    }

    fn missing(&self, field: &str) -> String {
        format!("NOT IS_DEFINED({})", field)
    }

    fn begins_with(&self, field: &str, param: &str) -> String {
        format!("STARTSWITH({}, {}, false)", field, param)
    }

    fn contains(&self, field: &str, param: &str) -> String {
        format!("CONTAINS({}, {}, false)", field, param)
    }

    fn array_contains(&self, field: &str, param: &str) -> String {
        format!("ARRAY_CONTAINS({}, {})", field, param)
    }

    fn in_list(&self, field: &str, params: &[String]) -> String {
        format!("{} IN ({})", field, params.join(", "))
    }
}

/// Compiles plans into [`SelectorQuery`] requests.
#[derive(Debug, Default)]
pub struct SelectorCompiler {
    partition_key_field: Option<String>,
}

impl SelectorCompiler {
    /// Creates a compiler without single-partition routing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes queries whose key part binds `field` to a single partition.
    pub fn with_partition_key(field: impl Into<String>) -> Self {
        Self {
            partition_key_field: Some(field.into()),
        }
    }
}

impl FilterCompiler for SelectorCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Selector
    }

    fn compile(&self, plan: &QueryPlan, projection: Option<&[FieldPath]>) -> DalResult<CompiledFilter> {
        plan.validate()?;
        let mut syntax = SelectorSyntax::default();
        let mut clauses = Vec::new();
        let mut partition_key = None;

        if let Some(key) = &plan.key {
            for condition in key.conditions() {
                clauses.push(render_condition(&mut syntax, condition, None)?);
            }
            let partition = &key.partition;
            if let (Some(field), Operator::Eq, Operand::Value(value)) =
                (&self.partition_key_field, partition.operator(), partition.operand())
                && partition.field().root() == field.as_str()
                && partition.field().is_top_level()
            {
                partition_key = Some(value.clone());
            }
        }
        clauses.extend(render_clause(&mut syntax, &plan.residual)?);

        let select = match projection.filter(|p| !p.is_empty()) {
            Some(paths) => paths.iter().map(selector_path).collect::<Vec<_>>().join(", "),
            None => "*".to_string(),
        };
        let mut query = format!("SELECT {} FROM c", select);
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        if let Some(sort_field) = &plan.sort_field {
            let direction = if plan.direction.is_ascending() { "ASC" } else { "DESC" };
            query.push_str(&format!(
                " ORDER BY {} {}",
                selector_path(&FieldPath::key(sort_field.clone())),
                direction
            ));
        }

        Ok(CompiledFilter::from_plan(
            plan,
            NativeFilter::Selector(SelectorQuery {
                query,
                parameters: syntax.parameters,
                partition_key,
            }),
        ))
    }
}
