//! The repository facade.
//!
//! A [`Repository`] binds one [`TableDescriptor`] to one store handle and
//! exposes the backend-neutral operations:
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | [`query_by_index`](Repository::query_by_index) | All matches (or the first `limit`) of an indexed query |
//! | [`query_by_index_paginated`](Repository::query_by_index_paginated) | One logical page plus an opaque next-page cursor |
//! | [`get_many_by_ids`](Repository::get_many_by_ids) | Batch retrieval with an optional post-filter |
//! | [`save`](Repository::save) | Validate, stamp the tenant and write |
//! | [`get_by_id`](Repository::get_by_id) / [`delete_by_id`](Repository::delete_by_id) | Single-record access |
//!
//! Every operation takes a [`TenantContext`] and only ever sees the caller's
//! tenant.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use std::sync::Arc;
//! use helios_dal::backends::memory::MemoryStore;
//! use helios_dal::compiler::Dialect;
//! use helios_dal::config::DalConfig;
//! use helios_dal::core::SharedStore;
//! use helios_dal::repository::{IndexQuery, Repository};
//! use helios_dal::tenant::{TenantContext, TenantId};
//! use helios_dal::types::{KeySchema, SecondaryIndexDescriptor, TableDescriptor};
//! use serde_json::json;
//!
//! let table = TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
//!     .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"));
//! let store = MemoryStore::new(Dialect::Expression).with_table(table.clone());
//! let repo = Repository::new(table, SharedStore::connected(Arc::new(store)), DalConfig::default()).unwrap();
//!
//! let ctx = TenantContext::new(TenantId::new("acme"));
//! let order = json!({"id": "o-1", "status": "open", "createdAt": "2024-05-01"});
//! repo.save(&ctx, order.as_object().cloned().unwrap()).await.unwrap();
//!
//! let page = repo
//!     .query_by_index_paginated(&ctx, &IndexQuery::new("byStatus", "open"), None)
//!     .await
//!     .unwrap();
//! assert_eq!(page.items[0]["tenantId"], "acme");
//! # });
//! ```

mod index_query;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::compiler::{CompiledFilter, Dialect, FilterCompiler};
use crate::config::DalConfig;
use crate::core::SharedStore;
use crate::engine::{BatchFetcher, Paginator, ResumePoints, ResumeStats, ScanRequest};
use crate::error::{DalResult, ValidationError};
use crate::query::{Group, matches};
use crate::tenant::TenantContext;
use crate::types::value::project;
use crate::types::{FieldPath, Page, PagingCursor, Record, TableDescriptor};
use crate::validate::{AcceptAll, RecordValidator};

pub use index_query::{IndexQuery, compiler_for_table, plan_index_query};

/// Backend-neutral access to one table.
pub struct Repository {
    table: TableDescriptor,
    store: SharedStore,
    compiler: Box<dyn FilterCompiler>,
    validator: Arc<dyn RecordValidator>,
    config: DalConfig,
    resume_points: ResumePoints,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table.table_name)
            .field("dialect", &self.compiler.dialect())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Creates a repository. The compiler is chosen from the store's dialect.
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidConfig` - the table descriptor or the
    ///   engine configuration fails validation
    pub fn new(table: TableDescriptor, store: SharedStore, config: DalConfig) -> DalResult<Self> {
        let mut messages = Vec::new();
        if let Err(mut errors) = table.validate() {
            messages.append(&mut errors);
        }
        if let Err(mut errors) = config.validate() {
            messages.append(&mut errors);
        }
        if !messages.is_empty() {
            return Err(ValidationError::InvalidConfig { messages }.into());
        }

        let compiler = compiler_for_table(store.dialect(), &table);
        let resume_points = ResumePoints::new(config.pagination.resume_capacity);
        Ok(Self {
            table,
            store,
            compiler,
            validator: Arc::new(AcceptAll),
            config,
            resume_points,
        })
    }

    /// Replaces the validator [`save`](Self::save) runs.
    pub fn with_validator(mut self, validator: Arc<dyn RecordValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The table this repository serves.
    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    /// The dialect queries are compiled for.
    pub fn dialect(&self) -> Dialect {
        self.compiler.dialect()
    }

    /// The engine configuration.
    pub fn config(&self) -> &DalConfig {
        &self.config
    }

    /// Counters of the server-side resume points.
    pub fn resume_stats(&self) -> ResumeStats {
        self.resume_points.stats()
    }

    /// Compiles `query` for the caller's tenant without executing it.
    ///
    /// The projection includes the key fields needed to resume after any
    /// returned record.
    pub fn compile(&self, ctx: &TenantContext, query: &IndexQuery) -> DalResult<CompiledFilter> {
        Ok(self.scan_request(ctx, query)?.filter)
    }

    fn scan_request(&self, ctx: &TenantContext, query: &IndexQuery) -> DalResult<ScanRequest> {
        let plan = plan_index_query(&self.table, ctx.tenant_id(), query)?;
        let index = self.table.index(query.index_name())?;
        let resume_fields = self.table.resume_key_fields(index);
        let projection = index_query::fetch_projection(query.fields(), &resume_fields);
        let filter = self.compiler.compile(&plan, projection.as_deref())?;

        if self.config.debug_logging {
            debug!(
                tenant = %ctx.tenant_id(),
                correlation_id = ?ctx.correlation_id(),
                compiled = %serde_json::to_string(&filter.native).unwrap_or_default(),
                "Compiled indexed query"
            );
        }

        Ok(ScanRequest {
            filter,
            primary_key: self.table.primary_key.clone(),
            resume_fields,
            projection: query.fields().filter(|f| !f.is_empty()).map(<[FieldPath]>::to_vec),
        })
    }

    /// Returns every match of `query`, or the first `limit` of them.
    ///
    /// # Errors
    ///
    /// Validation, index and tenant-scope errors are returned before any
    /// backend call. Backend errors propagate only when nothing was
    /// accumulated.
    #[instrument(skip(self, ctx, query), fields(table = %self.table.table_name, index = %query.index_name()))]
    pub async fn query_by_index(&self, ctx: &TenantContext, query: &IndexQuery) -> DalResult<Vec<Record>> {
        let request = self.scan_request(ctx, query)?;
        let store = self.store.get().await?;
        Paginator::new(store.as_ref(), &self.config.pagination)
            .with_debug_logging(self.config.debug_logging)
            .collect(ctx, &request, query.limit())
            .await
    }

    /// Returns the logical page `cursor` points at.
    ///
    /// The page size is taken from the cursor, then from the query's limit,
    /// then from the configured default. An unreadable cursor starts at the
    /// first page. The returned cursor only names the next page; where that
    /// page starts in the backend is remembered here.
    #[instrument(skip(self, ctx, query, cursor), fields(table = %self.table.table_name, index = %query.index_name()))]
    pub async fn query_by_index_paginated(
        &self,
        ctx: &TenantContext,
        query: &IndexQuery,
        cursor: Option<&str>,
    ) -> DalResult<Page<Record>> {
        let request = self.scan_request(ctx, query)?;
        let default_limit = query.limit().unwrap_or(self.config.pagination.default_page_size);
        let cursor = PagingCursor::resolve(cursor, default_limit);
        let store = self.store.get().await?;
        Paginator::new(store.as_ref(), &self.config.pagination)
            .with_resume_points(&self.resume_points)
            .with_debug_logging(self.config.debug_logging)
            .page(ctx, &request, cursor)
            .await
    }

    /// Fetches records by id.
    ///
    /// Duplicate ids are fetched once. `condition` is applied after
    /// retrieval; records of other tenants are dropped.
    #[instrument(skip(self, ctx, ids, fields, condition), fields(table = %self.table.table_name, ids = ids.len()))]
    pub async fn get_many_by_ids<S: AsRef<str>>(
        &self,
        ctx: &TenantContext,
        ids: &[S],
        fields: Option<&[FieldPath]>,
        condition: Option<&Group>,
    ) -> DalResult<Vec<Record>> {
        let keys = ids
            .iter()
            .map(|id| self.key_for_id(ctx, id.as_ref()))
            .collect::<DalResult<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store.get().await?;
        let fetched = BatchFetcher::new(store.as_ref(), &self.config.batch)
            .with_debug_logging(self.config.debug_logging)
            .fetch(ctx, &self.table.table_name, &keys)
            .await?;

        let fields = fields.filter(|f| !f.is_empty());
        Ok(fetched
            .into_iter()
            .filter(|record| self.owned_by(ctx, record))
            .filter(|record| condition.is_none_or(|c| matches(c, record)))
            .map(|record| match fields {
                Some(paths) => project(&record, paths),
                None => record,
            })
            .collect())
    }

    /// Validates `record`, stamps the caller's tenant on it and writes it.
    ///
    /// # Errors
    ///
    /// * `ValidationError::RecordRejected` - the validator refused the record,
    ///   or it names another tenant
    #[instrument(skip(self, ctx, record), fields(table = %self.table.table_name))]
    pub async fn save(&self, ctx: &TenantContext, record: Record) -> DalResult<Record> {
        let mut record = self
            .validator
            .validate(record)
            .map_err(|messages| ValidationError::RecordRejected { messages })?;

        let tenant_field = &self.table.tenant_field;
        match record.get(tenant_field) {
            Some(value) if !ctx.tenant_id().matches(value) => {
                return Err(ValidationError::RecordRejected {
                    messages: vec![format!("field '{}' names another tenant", tenant_field)],
                }
                .into());
            }
            Some(_) => {}
            None => {
                record.insert(tenant_field.clone(), ctx.tenant_id().to_value());
            }
        }

        let store = self.store.get().await?;
        store.put(&self.table.table_name, record.clone()).await?;
        Ok(record)
    }

    /// Reads one record. Records of other tenants are reported as absent.
    #[instrument(skip(self, ctx), fields(table = %self.table.table_name))]
    pub async fn get_by_id(&self, ctx: &TenantContext, id: &str) -> DalResult<Option<Record>> {
        let key = self.key_for_id(ctx, id)?;
        let store = self.store.get().await?;
        let record = store.get(&self.table.table_name, &key).await?;
        Ok(record.filter(|r| self.owned_by(ctx, r)))
    }

    /// Deletes one record of the caller's tenant. Returns `true` if it existed.
    #[instrument(skip(self, ctx), fields(table = %self.table.table_name))]
    pub async fn delete_by_id(&self, ctx: &TenantContext, id: &str) -> DalResult<bool> {
        if self.get_by_id(ctx, id).await?.is_none() {
            return Ok(false);
        }
        let key = self.key_for_id(ctx, id)?;
        let store = self.store.get().await?;
        store.delete(&self.table.table_name, &key).await
    }

    /// Builds the primary key addressed by `id`.
    ///
    /// The id is the partition key. A sort key is only derivable when it is
    /// the tenant field.
    fn key_for_id(&self, ctx: &TenantContext, id: &str) -> DalResult<Record> {
        let schema = &self.table.primary_key;
        let mut key = Record::new();
        key.insert(schema.partition_key.clone(), Value::String(id.to_string()));
        match &schema.sort_key {
            Some(sort) if *sort == self.table.tenant_field => {
                key.insert(sort.clone(), ctx.tenant_id().to_value());
            }
            Some(sort) => {
                return Err(ValidationError::InvalidKey {
                    table: self.table.table_name.clone(),
                    message: format!("sort key '{}' cannot be derived from an id", sort),
                }
                .into());
            }
            None => {}
        }
        Ok(key)
    }

    fn owned_by(&self, ctx: &TenantContext, record: &Record) -> bool {
        let owned = record
            .get(&self.table.tenant_field)
            .is_some_and(|value| ctx.tenant_id().matches(value));
        if !owned {
            warn!(
                table = %self.table.table_name,
                tenant = %ctx.tenant_id(),
                "Dropping record outside the caller's tenant"
            );
        }
        owned
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::error::DalError;
    use crate::tenant::TenantId;
    use crate::types::{KeySchema, SecondaryIndexDescriptor};
    use crate::validate::RequiredFields;
    use serde_json::json;

    fn table() -> TableDescriptor {
        TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
            .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"))
    }

    fn repo(dialect: Dialect) -> (Repository, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(dialect).with_table(table()));
        let repo = Repository::new(table(), SharedStore::connected(store.clone()), DalConfig::default()).unwrap();
        (repo, store)
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn ctx(tenant: &str) -> TenantContext {
        TenantContext::new(TenantId::new(tenant))
    }

    #[tokio::test]
    async fn test_save_stamps_tenant() {
        let (repo, _) = repo(Dialect::Expression);
        let saved = repo
            .save(&ctx("t1"), record(json!({"id": "o-1", "status": "open"})))
            .await
            .unwrap();
        assert_eq!(saved["tenantId"], "t1");
        assert_eq!(repo.get_by_id(&ctx("t1"), "o-1").await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_save_rejects_foreign_tenant_and_invalid_records() {
        let (repo, store) = repo(Dialect::Document);
        let err = repo
            .save(&ctx("t1"), record(json!({"id": "o-1", "tenantId": "t2"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DalError::Validation(ValidationError::RecordRejected { .. })));

        let strict = Repository::new(table(), SharedStore::connected(store.clone()), DalConfig::default())
            .unwrap()
            .with_validator(Arc::new(RequiredFields::new(["status"])));
        let err = strict.save(&ctx("t1"), record(json!({"id": "o-2"}))).await.unwrap_err();
        assert!(err.to_string().contains("missing required field 'status'"));
        assert_eq!(store.record_count("orders"), 0);
    }

    #[tokio::test]
    async fn test_other_tenants_records_are_invisible() {
        let (repo, _) = repo(Dialect::Statement);
        repo.save(&ctx("t1"), record(json!({"id": "o-1"}))).await.unwrap();

        assert_eq!(repo.get_by_id(&ctx("t2"), "o-1").await.unwrap(), None);
        assert!(!repo.delete_by_id(&ctx("t2"), "o-1").await.unwrap());
        assert!(repo.delete_by_id(&ctx("t1"), "o-1").await.unwrap());
        assert_eq!(repo.get_by_id(&ctx("t1"), "o-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_compile_errors_precede_backend_calls() {
        let (repo, store) = repo(Dialect::Selector);
        let err = repo
            .query_by_index(&ctx("t1"), &IndexQuery::new("byColour", "red"))
            .await
            .unwrap_err();
        assert!(err.is_compile_time());
        assert_eq!(store.stats().query_calls, 0);
    }

    #[tokio::test]
    async fn test_composite_sort_key_cannot_come_from_id() {
        let table = TableDescriptor::new("events", KeySchema::composite("id", "at"), "tenantId");
        let store = Arc::new(MemoryStore::new(Dialect::Expression).with_table(table.clone()));
        let repo = Repository::new(table, SharedStore::connected(store), DalConfig::default()).unwrap();
        let err = repo.get_by_id(&ctx("t1"), "e-1").await.unwrap_err();
        assert!(matches!(err, DalError::Validation(ValidationError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn test_tenant_sort_key_is_derived_from_context() {
        let table = TableDescriptor::new("shared", KeySchema::composite("id", "tenantId"), "tenantId");
        let store = Arc::new(MemoryStore::new(Dialect::Expression).with_table(table.clone()));
        let repo = Repository::new(table, SharedStore::connected(store), DalConfig::default()).unwrap();
        repo.save(&ctx("t1"), record(json!({"id": "x"}))).await.unwrap();
        repo.save(&ctx("t2"), record(json!({"id": "x"}))).await.unwrap();

        let found = repo.get_many_by_ids(&ctx("t2"), &["x", "x"], None, None).await.unwrap();
        assert_eq!(found, vec![record(json!({"id": "x", "tenantId": "t2"}))]);
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let store = Arc::new(MemoryStore::new(Dialect::Expression).with_table(table()));
        let mut config = DalConfig::default();
        config.pagination.min_evaluation_limit = 500;
        config.pagination.max_evaluation_limit = 100;

        let err = Repository::new(table(), SharedStore::connected(store.clone()), config).unwrap_err();
        assert!(matches!(err, DalError::Validation(ValidationError::InvalidConfig { .. })));
        assert!(err.to_string().contains("Minimum evaluation limit"));

        let nameless = TableDescriptor::new("", KeySchema::partition("id"), "tenantId");
        let err = Repository::new(nameless, SharedStore::connected(store), DalConfig::default()).unwrap_err();
        assert!(err.to_string().contains("table name must not be empty"));
    }

    #[tokio::test]
    async fn test_next_page_cursor_names_only_the_page() {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

        let (repo, _) = repo(Dialect::Expression);
        for i in 0..3 {
            let order = json!({"id": format!("o-{}", i), "status": "open", "createdAt": format!("2024-0{}", i)});
            repo.save(&ctx("t1"), record(order)).await.unwrap();
        }

        let query = IndexQuery::new("byStatus", "open").with_limit(2);
        let first = repo.query_by_index_paginated(&ctx("t1"), &query, None).await.unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(first.next_page_hash().unwrap()).unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wire, json!({"pageNo": 2, "limit": 2}));

        let second = repo
            .query_by_index_paginated(&ctx("t1"), &query, first.next_page_hash())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["id"], "o-2");
        assert_eq!(repo.resume_stats().hits, 1);
    }
}
