//! Expression dialect compiler.
//!
//! Output mirrors the request shape of key-condition stores:
//!
//! ```text
//! KeyConditionExpression: #n0 = :v0 AND #n1 BETWEEN :v1 AND :v2
//! FilterExpression:       #n2 = :v3 AND (attribute_not_exists(#n3) OR #n3 <> :v4)
//! ```
//!
//! No field name or literal is ever rendered inline.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::placeholder::ExpressionBuilder;
use super::render::{InfixSyntax, render_clause, render_condition};
use super::{CompiledFilter, Dialect, FilterCompiler, NativeFilter, QueryPlan};
use crate::error::DalResult;
use crate::marshal::{AttributeMarshaller, AttributeValue, Marshaller};
use crate::types::FieldPath;

/// A compiled expression-dialect request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpressionQuery {
    /// Key condition over the index partition and sort keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_condition_expression: Option<String>,
    /// Residual filter applied after key selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,
    /// Returned attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    /// `#nN` alias to attribute name.
    pub expression_attribute_names: BTreeMap<String, String>,
    /// `:vN` alias to typed literal.
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
    /// Ascending scan when `true`.
    pub scan_index_forward: bool,
}

struct ExpressionSyntax<'a> {
    builder: &'a mut ExpressionBuilder,
}

impl InfixSyntax for ExpressionSyntax<'_> {
    fn field(&mut self, path: &FieldPath) -> String {
        self.builder.add_path(path)
    }

    fn param(&mut self, value: &Value) -> String {
        self.builder.add_value(value)
    }

    fn not_equal(&self) -> &'static str {
        "<>"
    }

    fn defined(&self, field: &str) -> String {
        format!("attribute_exists({})", field)
    }

    fn missing(&self, field: &str) -> String {
        format!("attribute_not_exists({})", field)
    }

    fn begins_with(&self, field: &str, param: &str) -> String {
        format!("begins_with({}, {})", field, param)
    }

    fn contains(&self, field: &str, param: &str) -> String {
        format!("contains({}, {})", field, param)
    }

    fn array_contains(&self, field: &str, param: &str) -> String {
        format!("contains({}, {})", field, param)
    }

    fn in_list(&self, field: &str, params: &[String]) -> String {
        format!("{} IN ({})", field, params.join(", "))
    }
}

/// Compiles plans into [`ExpressionQuery`] requests.
#[derive(Debug, Default)]
pub struct ExpressionCompiler {
    marshaller: AttributeMarshaller,
}

impl ExpressionCompiler {
    /// Creates a compiler using the default marshaller.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterCompiler for ExpressionCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Expression
    }

    fn compile(&self, plan: &QueryPlan, projection: Option<&[FieldPath]>) -> DalResult<CompiledFilter> {
        plan.validate()?;
        let mut builder = ExpressionBuilder::new();

        if let Some(key) = &plan.key {
            for condition in key.conditions() {
                let fragment = render_condition(
                    &mut ExpressionSyntax {
                        builder: &mut builder,
                    },
                    condition,
                    None,
                )?;
                builder.add_key_condition(fragment);
            }
        }

        let residual = render_clause(
            &mut ExpressionSyntax {
                builder: &mut builder,
            },
            &plan.residual,
        )?;
        if let Some(residual) = residual {
            builder.add_filter(residual);
        }

        let projection_expression = projection.filter(|p| !p.is_empty()).map(|paths| {
            paths
                .iter()
                .map(|path| builder.add_path(path))
                .collect::<Vec<_>>()
                .join(", ")
        });

        let parts = builder.result();
        let query = ExpressionQuery {
            key_condition_expression: parts.key_condition,
            filter_expression: parts.filter,
            projection_expression,
            expression_attribute_names: parts.names,
            expression_attribute_values: parts
                .values
                .iter()
                .map(|(alias, value)| (alias.clone(), self.marshaller.marshal(value)))
                .collect(),
            scan_index_forward: plan.direction.is_ascending(),
        };
        Ok(CompiledFilter::from_plan(plan, NativeFilter::Expression(query)))
    }
}
