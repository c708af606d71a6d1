//! Statement dialect compiler.
//!
//! Produces parameterised pseudo-SQL with positional `?` parameters bound as
//! typed attributes:
//!
//! ```text
//! SELECT * FROM "orders"."byStatus" WHERE "status" = ? AND "tags" IN [?, ?]
//! ```

use serde::Serialize;
use serde_json::Value;

use super::render::{InfixSyntax, render_clause, render_condition};
use super::{CompiledFilter, Dialect, FilterCompiler, NativeFilter, QueryPlan};
use crate::error::DalResult;
use crate::marshal::{AttributeMarshaller, AttributeValue, Marshaller};
use crate::types::{FieldPath, PathSegment};

/// A compiled statement-dialect request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatementQuery {
    /// Statement text.
    pub statement: String,
    /// Positional parameters.
    pub parameters: Vec<AttributeValue>,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Renders a path with quoted members (`"items"[0]."sku"`).
pub(crate) fn statement_path(path: &FieldPath) -> String {
    let mut rendered = String::new();
    for segment in path.segments() {
        match segment {
            PathSegment::Key(name) => {
                if !rendered.is_empty() {
                    rendered.push('.');
                }
                rendered.push_str(&quote(name));
            }
            PathSegment::Index(i) => rendered.push_str(&format!("[{}]", i)),
        }
    }
    rendered
}

struct StatementSyntax<'a> {
    marshaller: &'a dyn Marshaller,
    parameters: Vec<AttributeValue>,
}

impl InfixSyntax for StatementSyntax<'_> {
    fn field(&mut self, path: &FieldPath) -> String {
        statement_path(path)
    }

    fn param(&mut self, value: &Value) -> String {
        self.parameters.push(self.marshaller.marshal(value));
        "?".to_string()
    }

    fn not_equal(&self) -> &'static str {
        "<>"
    }

    fn defined(&self, field: &str) -> String {
        format!("{} IS NOT MISSING", field)
    }

    fn missing(&self, field: &str) -> String {
        format!("{} IS MISSING", field)
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
        format!("{} IN [{}]", field, params.join(", "))
    }
}

/// Compiles plans into [`StatementQuery`] requests.
#[derive(Debug, Default)]
pub struct StatementCompiler {
    marshaller: AttributeMarshaller,
}

impl StatementCompiler {
    /// Creates a compiler using the default marshaller.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterCompiler for StatementCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Statement
    }

    fn compile(&self, plan: &QueryPlan, projection: Option<&[FieldPath]>) -> DalResult<CompiledFilter> {
        plan.validate()?;
        let mut syntax = StatementSyntax {
            marshaller: &self.marshaller,
            parameters: Vec::new(),
        };
        let mut clauses = Vec::new();
        if let Some(key) = &plan.key {
            for condition in key.conditions() {
                clauses.push(render_condition(&mut syntax, condition, None)?);
            }
        }
        clauses.extend(render_clause(&mut syntax, &plan.residual)?);

        let select = match projection.filter(|p| !p.is_empty()) {
            Some(paths) => paths.iter().map(statement_path).collect::<Vec<_>>().join(", "),
            None => "*".to_string(),
        };
        let source = match &plan.index_name {
            Some(index) => format!("{}.{}", quote(&plan.table_name), quote(index)),
            None => quote(&plan.table_name),
        };
        let mut statement = format!("SELECT {} FROM {}", select, source);
        if !clauses.is_empty() {
            statement.push_str(" WHERE ");
            statement.push_str(&clauses.join(" AND "));
        }
        if let Some(sort_field) = &plan.sort_field {
            let direction = if plan.direction.is_ascending() { "ASC" } else { "DESC" };
            statement.push_str(&format!(" ORDER BY {} {}", quote(sort_field), direction));
        }

        Ok(CompiledFilter::from_plan(
            plan,
            NativeFilter::Statement(StatementQuery {
                statement,
                parameters: syntax.parameters,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{KeyPart, SortDirection};
    use crate::query::{FieldCondition, parse};
    use serde_json::json;

    fn compile(plan: &QueryPlan, projection: Option<&[FieldPath]>) -> StatementQuery {
        match StatementCompiler::new().compile(plan, projection).unwrap().native {
            NativeFilter::Statement(query) => query,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_statement_over_index() {
        let plan = QueryPlan::new("orders")
            .with_index("byStatus")
            .with_key(KeyPart::new(FieldCondition::eq("status", "open").unwrap()))
            .with_residual(parse(&json!({"region": {"in": ["eu", "us"]}})).unwrap())
            .with_order(Some("createdAt".into()), SortDirection::Descending);
        let query = compile(&plan, None);
        assert_eq!(
            query.statement,
            r#"SELECT * FROM "orders"."byStatus" WHERE "status" = ? AND "region" IN [?, ?] ORDER BY "createdAt" DESC"#
        );
        assert_eq!(
            query.parameters,
            vec![
                AttributeValue::S("open".into()),
                AttributeValue::S("eu".into()),
                AttributeValue::S("us".into()),
            ]
        );
    }

    #[test]
    fn test_missing_guard_and_exists() {
        let plan = QueryPlan::new("orders")
            .with_residual(parse(&json!({"note": {"exists": false}, "status": {"nin": ["a", "b"]}})).unwrap());
        let query = compile(&plan, None);
        assert_eq!(
            query.statement,
            r#"SELECT * FROM "orders" WHERE "note" IS MISSING AND ("status" IS MISSING OR NOT ("status" IN [?, ?]))"#
        );
    }

    #[test]
    fn test_identifiers_are_quoted() {
        let plan = QueryPlan::new("odd\"table");
        let fields = [FieldPath::parse("items").unwrap().with_index(0).join(&FieldPath::key("sku"))];
        let query = compile(&plan, Some(&fields));
        assert_eq!(query.statement, r#"SELECT "items"[0]."sku" FROM "odd""table""#);
    }
}
