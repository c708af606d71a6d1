//! Indexed query values and planning.

use serde_json::Value;

use crate::compiler::{Dialect, FilterCompiler, QueryPlan, SelectorCompiler, SortDirection, compiler_for};
use crate::error::DalResult;
use crate::index::IndexResolver;
use crate::query::{Group, parse};
use crate::tenant::TenantId;
use crate::types::{FieldPath, TableDescriptor};

/// A query against one secondary index.
///
/// Builder methods consume and return the value, so a query handed to the
/// repository is never modified by it.
///
/// # Example
///
/// ```
/// use helios_dal::compiler::SortDirection;
/// use helios_dal::repository::IndexQuery;
/// use serde_json::json;
///
/// let query = IndexQuery::new("byStatus", "open")
///     .with_sort_key(json!({"gte": "2024-01-01"}))
///     .with_filter_json(&json!({"amount": {"between": [100, 500]}}))
///     .unwrap()
///     .with_direction(SortDirection::Descending)
///     .with_limit(20);
/// assert_eq!(query.index_name(), "byStatus");
/// assert_eq!(query.limit(), Some(20));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    index_name: String,
    partition_value: Value,
    sort_key_query: Option<Value>,
    filter: Option<Group>,
    fields: Option<Vec<FieldPath>>,
    direction: SortDirection,
    limit: Option<u32>,
}

impl IndexQuery {
    /// Creates a query for the partition `partition_value` of `index_name`.
    pub fn new(index_name: impl Into<String>, partition_value: impl Into<Value>) -> Self {
        Self {
            index_name: index_name.into(),
            partition_value: partition_value.into(),
            sort_key_query: None,
            filter: None,
            fields: None,
            direction: SortDirection::Ascending,
            limit: None,
        }
    }

    /// Constrains the index sort key: a scalar for equality or an operator map.
    pub fn with_sort_key(mut self, query: Value) -> Self {
        self.sort_key_query = Some(query);
        self
    }

    /// Adds a residual filter.
    pub fn with_filter(mut self, filter: Group) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Parses and adds a residual filter.
    pub fn with_filter_json(self, filter: &Value) -> DalResult<Self> {
        Ok(self.with_filter(parse(filter)?))
    }

    /// Restricts the returned fields.
    pub fn with_fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Sets the scan direction over the index sort key.
    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Caps the result: the page size when paginating, the total otherwise.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The queried index.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// The partition value.
    pub fn partition_value(&self) -> &Value {
        &self.partition_value
    }

    /// The sort key constraint.
    pub fn sort_key_query(&self) -> Option<&Value> {
        self.sort_key_query.as_ref()
    }

    /// The residual filter.
    pub fn filter(&self) -> Option<&Group> {
        self.filter.as_ref()
    }

    /// The requested fields.
    pub fn fields(&self) -> Option<&[FieldPath]> {
        self.fields.as_deref()
    }

    /// The scan direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// The limit, ignoring a zero limit.
    pub fn limit(&self) -> Option<u32> {
        self.limit.filter(|l| *l > 0)
    }
}

/// Resolves `query` on `table` for `tenant` into a plan any compiler accepts.
///
/// # Errors
///
/// Unknown indexes, malformed sort key constraints and tenant scope
/// conflicts are reported here, before any backend call.
pub fn plan_index_query(table: &TableDescriptor, tenant: &TenantId, query: &IndexQuery) -> DalResult<QueryPlan> {
    let resolved = IndexResolver::new(table).resolve(
        &query.index_name,
        &query.partition_value,
        query.sort_key_query.as_ref(),
        query.filter.as_ref(),
        &tenant.to_value(),
    )?;
    Ok(QueryPlan::new(&table.table_name)
        .with_index(&query.index_name)
        .with_key(resolved.key)
        .with_residual(resolved.residual)
        .with_order(resolved.sort_field, query.direction))
}

/// Returns the compiler a repository over `table` uses for `dialect`.
///
/// Selector containers are partitioned by the tenant field, so selector
/// queries keyed on it are routed to one partition.
pub fn compiler_for_table(dialect: Dialect, table: &TableDescriptor) -> Box<dyn FilterCompiler> {
    match dialect {
        Dialect::Selector => Box::new(SelectorCompiler::with_partition_key(table.tenant_field.clone())),
        other => compiler_for(other),
    }
}

/// The projection to request from the backend: the caller's fields plus the
/// fields a resume key needs.
pub(crate) fn fetch_projection(fields: Option<&[FieldPath]>, key_fields: &[String]) -> Option<Vec<FieldPath>> {
    let fields = fields.filter(|f| !f.is_empty())?;
    let mut projection = fields.to_vec();
    for field in key_fields {
        let path = FieldPath::key(field.clone());
        if !projection.contains(&path) {
            projection.push(path);
        }
    }
    Some(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::NativeFilter;
    use crate::error::{DalError, IndexError};
    use crate::types::{KeySchema, SecondaryIndexDescriptor};
    use serde_json::json;

    fn table() -> TableDescriptor {
        TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
            .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"))
            .with_index(SecondaryIndexDescriptor::new("byTenant", "tenantId").with_sort_key("createdAt"))
    }

    #[test]
    fn test_builder_leaves_original_untouched() {
        let base = IndexQuery::new("byStatus", "open");
        let limited = base.clone().with_limit(5);
        assert_eq!(base.limit(), None);
        assert_eq!(limited.limit(), Some(5));
        assert_eq!(IndexQuery::new("byStatus", "open").with_limit(0).limit(), None);
    }

    #[test]
    fn test_plan_appends_tenant_to_residual() {
        let query = IndexQuery::new("byStatus", "open");
        let plan = plan_index_query(&table(), &TenantId::new("t1"), &query).unwrap();
        assert_eq!(plan.index_name.as_deref(), Some("byStatus"));
        assert_eq!(plan.sort_field.as_deref(), Some("createdAt"));
        let tenant: Vec<_> = plan
            .residual
            .top_level_fields()
            .filter(|c| c.field().root() == "tenantId")
            .collect();
        assert_eq!(tenant.len(), 1);
    }

    #[test]
    fn test_plan_unknown_index() {
        let query = IndexQuery::new("byColour", "red");
        let err = plan_index_query(&table(), &TenantId::new("t1"), &query).unwrap_err();
        assert!(matches!(err, DalError::Index(IndexError::NotFound { .. })));
    }

    #[test]
    fn test_selector_routes_tenant_partition() {
        let table = table();
        let query = IndexQuery::new("byTenant", "t1");
        let plan = plan_index_query(&table, &TenantId::new("t1"), &query).unwrap();
        let compiled = compiler_for_table(Dialect::Selector, &table).compile(&plan, None).unwrap();
        let NativeFilter::Selector(selector) = compiled.native else {
            panic!("expected a selector query");
        };
        assert_eq!(selector.partition_key, Some(json!("t1")));
    }

    #[test]
    fn test_fetch_projection_adds_key_fields_once() {
        let keys = vec!["id".to_string(), "status".to_string()];
        let fields = vec![FieldPath::key("status"), FieldPath::parse("address.city").unwrap()];
        let projection = fetch_projection(Some(&fields), &keys).unwrap();
        assert_eq!(
            projection,
            vec![
                FieldPath::key("status"),
                FieldPath::parse("address.city").unwrap(),
                FieldPath::key("id")
            ]
        );
        assert_eq!(fetch_projection(None, &keys), None);
    }
}
