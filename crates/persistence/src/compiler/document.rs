//! Document dialect compiler.
//!
//! Renders native operator documents:
//!
//! ```text
//! {"$and": [{"status": {"$eq": "open"}}, {"amount": {"$gte": 100, "$lte": 500}}]}
//! ```
//!
//! Substring tests become literal-escaped regular expressions; user input is
//! never interpreted as a pattern. Matching is case-sensitive, as in every
//! other dialect.

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{CompiledFilter, Dialect, FilterCompiler, NativeFilter, QueryPlan};
use crate::error::{DalResult, ValidationError};
use crate::query::{Condition, FieldCondition, Group, GroupKind, Operand, Operator};
use crate::types::FieldPath;

/// A compiled document-dialect request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQuery {
    /// The filter document (`{}` matches everything).
    pub filter: Value,
    /// Inclusion projection, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    /// Sort document over the index keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
}

/// Compiles plans into [`DocumentQuery`] requests.
#[derive(Debug, Default)]
pub struct DocumentCompiler;

impl DocumentCompiler {
    /// Creates the compiler.
    pub fn new() -> Self {
        Self
    }
}

impl FilterCompiler for DocumentCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Document
    }

    fn compile(&self, plan: &QueryPlan, projection: Option<&[FieldPath]>) -> DalResult<CompiledFilter> {
        plan.validate()?;
        let mut clauses = Vec::new();
        if let Some(key) = &plan.key {
            for condition in key.conditions() {
                clauses.push(render_condition(condition, None)?);
            }
        }
        if let Some(residual) = render_group(&plan.residual)? {
            clauses.push(residual);
        }

        let filter = match clauses.len() {
            0 => json!({}),
            1 => clauses.remove(0),
            _ => json!({"$and": clauses}),
        };

        let projection = projection.filter(|p| !p.is_empty()).map(|paths| {
            let fields: Map<String, Value> = paths
                .iter()
                .map(|path| (path.to_dotted(), json!(1)))
                .collect();
            Value::Object(fields)
        });

        let sort = sort_document(plan);

        Ok(CompiledFilter::from_plan(
            plan,
            NativeFilter::Document(DocumentQuery {
                filter,
                projection,
                sort,
            }),
        ))
    }
}

fn sort_document(plan: &QueryPlan) -> Option<Value> {
    let order = if plan.direction.is_ascending() { 1 } else { -1 };
    let mut sort = Map::new();
    if let Some(key) = &plan.key {
        sort.insert(key.partition.field().to_dotted(), json!(order));
    }
    if let Some(field) = &plan.sort_field {
        sort.insert(field.clone(), json!(order));
    }
    (!sort.is_empty()).then_some(Value::Object(sort))
}

fn render_group(group: &Group) -> DalResult<Option<Value>> {
    let mut parts = Vec::with_capacity(group.members.len());
    for member in &group.members {
        let part = match member {
            Condition::Field(condition) => Some(render_condition(condition, None)?),
            Condition::Group(inner) => render_group(inner)?,
        };
        parts.extend(part);
    }
    let op = match group.kind {
        GroupKind::And => "$and",
        GroupKind::Or => "$or",
    };
    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(on_field(op, Value::Array(parts))),
    })
}

fn literal_regex(term: &str) -> Value {
    json!({"$regex": regex::escape(term)})
}

fn on_field(field: &str, test: Value) -> Value {
    let mut doc = Map::new();
    doc.insert(field.to_string(), test);
    Value::Object(doc)
}

fn render_condition(condition: &FieldCondition, base: Option<&FieldPath>) -> DalResult<Value> {
    let path = match base {
        Some(base) => base.join(condition.field()),
        None => condition.field().clone(),
    };
    let field = path.to_dotted();

    let doc = match (condition.operator(), condition.operand()) {
        (Operator::Eq, Operand::Value(v)) => on_field(&field, json!({"$eq": v})),
        (Operator::Ne, Operand::Value(v)) => on_field(&field, json!({"$ne": v})),
        (Operator::Lt, Operand::Value(v)) => on_field(&field, json!({"$lt": v})),
        (Operator::Lte, Operand::Value(v)) => on_field(&field, json!({"$lte": v})),
        (Operator::Gt, Operand::Value(v)) => on_field(&field, json!({"$gt": v})),
        (Operator::Gte, Operand::Value(v)) => on_field(&field, json!({"$gte": v})),
        (Operator::Between, Operand::Range { low, high }) => {
            on_field(&field, json!({"$gte": low, "$lte": high}))
        }
        (Operator::BeginsWith, Operand::Value(Value::String(prefix))) => {
            let mut spec = Map::new();
            spec.insert("$regex".into(), Value::String(format!("^{}", regex::escape(prefix))));
            on_field(&field, Value::Object(spec))
        }
        (Operator::Contains, Operand::Value(Value::String(term))) => {
            on_field(&field, literal_regex(term))
        }
        (Operator::NotContains, Operand::Value(Value::String(term))) => {
            on_field(&field, json!({"$not": literal_regex(term)}))
        }
        (Operator::In, Operand::List(values)) => on_field(&field, json!({"$in": values})),
        (Operator::Nin, Operand::List(values)) => on_field(&field, json!({"$nin": values})),
        (Operator::Exists, Operand::Flag(flag)) => on_field(&field, json!({"$exists": flag})),
        (Operator::ElemMatch, Operand::List(values)) => {
            let mut tests: Vec<Value> = values
                .iter()
                .map(|v| on_field(&field, json!({"$elemMatch": {"$eq": v}})))
                .collect();
            if tests.len() == 1 {
                tests.remove(0)
            } else {
                json!({"$or": tests})
            }
        }
        (Operator::NestedMatch | Operator::NestedArrayMatch, Operand::Nested(spec)) => {
            let base = match spec.index {
                Some(index) => path.with_index(index),
                None => path,
            };
            let mut tests = spec
                .conditions
                .iter()
                .map(|sub| render_condition(sub, Some(&base)))
                .collect::<DalResult<Vec<_>>>()?;
            if tests.len() == 1 {
                tests.remove(0)
            } else {
                json!({"$and": tests})
            }
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
    Ok(doc)
}
