//! Index resolver.
//!
//! Every resolved query carries an exact-match constraint on the tenant
//! field. When the index is keyed on the tenant field the constraint is the
//! key condition itself; otherwise it is appended to the residual filter.
//! Inputs are never modified; each stage builds new values.

use serde_json::Value;

use crate::compiler::KeyPart;
use crate::error::{DalResult, ValidationError};
use crate::query::{Condition, FieldCondition, Group, GroupKind, Operand, Operator, parse_field_conditions};
use crate::types::value::values_equal;
use crate::types::{FieldPath, SecondaryIndexDescriptor, TableDescriptor};

/// The outcome of resolving an indexed query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    /// Conditions bound to the index keys, partition first.
    pub key: KeyPart,
    /// Everything else, including the tenant constraint when it is not a key.
    pub residual: Group,
    /// Sort key field of the index.
    pub sort_field: Option<String>,
}

/// Resolves indexed queries against one table.
#[derive(Debug, Clone, Copy)]
pub struct IndexResolver<'a> {
    table: &'a TableDescriptor,
}

impl<'a> IndexResolver<'a> {
    /// Creates a resolver for `table`.
    pub fn new(table: &'a TableDescriptor) -> Self {
        Self { table }
    }

    /// Splits a query on `index_name` into key part and residual.
    ///
    /// * `partition_value` - value of the index partition key
    /// * `sort_key_query` - operator map (or scalar) on the index sort key
    /// * `extra` - additional filter conditions
    /// * `tenant_value` - the caller's tenant
    pub fn resolve(
        &self,
        index_name: &str,
        partition_value: &Value,
        sort_key_query: Option<&Value>,
        extra: Option<&Group>,
        tenant_value: &Value,
    ) -> DalResult<ResolvedQuery> {
        let index = self.table.index(index_name)?;
        let tenant_field = self.table.tenant_field.as_str();

        let partition = self.partition_condition(index, partition_value, tenant_value)?;
        let mut key = KeyPart::new(partition);
        let mut residual: Vec<Condition> = Vec::new();

        match index.sort_key_field.as_deref() {
            Some(sort_field) if sort_field == tenant_field => {
                key.sort = Some(exact(sort_field, tenant_value)?);
                if let Some(query) = sort_key_query {
                    residual.extend(sort_conditions(sort_field, query)?.into_iter().map(Condition::Field));
                }
            }
            Some(sort_field) => {
                if let Some(query) = sort_key_query {
                    for condition in sort_conditions(sort_field, query)? {
                        if key.sort.is_none() && condition.operator().allowed_in_key_condition() {
                            key.sort = Some(condition);
                        } else {
                            residual.push(Condition::Field(condition));
                        }
                    }
                }
            }
            None if sort_key_query.is_some() => {
                return Err(ValidationError::InvalidQueryShape {
                    message: format!("index '{}' has no sort key", index.index_name),
                }
                .into());
            }
            None => {}
        }

        if let Some(extra) = extra {
            residual.extend(self.bucket_extra(index, &mut key, extra));
        }

        if !index.is_key_field(tenant_field) {
            residual.push(Condition::Field(exact(tenant_field, tenant_value)?));
        }

        Ok(ResolvedQuery {
            key,
            residual: Group::and(residual),
            sort_field: index.sort_key_field.clone(),
        })
    }

    fn partition_condition(
        &self,
        index: &SecondaryIndexDescriptor,
        partition_value: &Value,
        tenant_value: &Value,
    ) -> DalResult<FieldCondition> {
        let field = index.partition_key_field.as_str();
        if field == self.table.tenant_field && !values_equal(partition_value, tenant_value) {
            return Err(ValidationError::TenantScopeConflict {
                index_name: index.index_name.clone(),
                tenant_field: field.to_string(),
            }
            .into());
        }
        exact(field, partition_value)
    }

    /// Moves top-level conditions on the sort key into the key part when the
    /// slot is free; returns the remaining conditions.
    fn bucket_extra(&self, index: &SecondaryIndexDescriptor, key: &mut KeyPart, extra: &Group) -> Vec<Condition> {
        if extra.kind == GroupKind::Or {
            return if extra.is_empty() {
                Vec::new()
            } else {
                vec![Condition::Group(extra.clone())]
            };
        }

        let mut remaining = Vec::with_capacity(extra.members.len());
        for member in &extra.members {
            if let Condition::Field(condition) = member {
                let on_sort_key = condition.field().is_top_level()
                    && index.sort_key_field.as_deref() == Some(condition.field().root());
                if on_sort_key && key.sort.is_none() && condition.operator().allowed_in_key_condition() {
                    key.sort = Some(condition.clone());
                    continue;
                }
                if is_redundant_partition_match(&key.partition, condition) {
                    continue;
                }
            }
            remaining.push(member.clone());
        }
        remaining
    }
}

fn exact(field: &str, value: &Value) -> DalResult<FieldCondition> {
    FieldCondition::new(FieldPath::key(field), Operator::Eq, Operand::Value(value.clone()))
}

fn sort_conditions(sort_field: &str, query: &Value) -> DalResult<Vec<FieldCondition>> {
    parse_field_conditions(&FieldPath::key(sort_field), query)
}

fn is_redundant_partition_match(partition: &FieldCondition, condition: &FieldCondition) -> bool {
    condition.field() == partition.field()
        && condition.operator() == Operator::Eq
        && condition.operand() == partition.operand()
}
