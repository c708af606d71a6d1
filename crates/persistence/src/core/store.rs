//! The record store trait.
//!
//! A [`RecordStore`] is the boundary to one backend. It executes compiled
//! queries and key-addressed reads and writes; it does not paginate, retry or
//! apply tenant scoping. Those live in the engine.

use async_trait::async_trait;

use crate::compiler::{CompiledFilter, Dialect};
use crate::error::{BackendError, DalResult};
use crate::types::{NativeContinuation, Record};

/// One backend query call.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    /// The compiled query.
    pub filter: CompiledFilter,
    /// Per-call limit, counted per the dialect's limit semantics.
    pub limit: u32,
    /// Where to resume, if not at the start.
    pub continuation: Option<NativeContinuation>,
}

/// The result of one backend query call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Matching records, in index order.
    pub items: Vec<Record>,
    /// Present when the backend has more data to scan.
    pub continuation: Option<NativeContinuation>,
}

/// The result of one multi-get call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiGetOutput {
    /// Records found. Missing keys are omitted.
    pub items: Vec<Record>,
    /// Keys the backend did not process in this call.
    pub unprocessed_keys: Vec<Record>,
}

/// Key-addressed and query access to one backend.
///
/// # Example
///
/// ```ignore
/// use helios_dal::core::{RecordStore, StoreQuery};
///
/// async fn first_page(store: &dyn RecordStore, filter: CompiledFilter) -> DalResult<usize> {
///     let output = store
///         .query(StoreQuery { filter, limit: 100, continuation: None })
///         .await?;
///     Ok(output.items.len())
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &str;

    /// The dialect this backend executes.
    fn dialect(&self) -> Dialect;

    /// Reads one record by primary key.
    async fn get(&self, table_name: &str, key: &Record) -> DalResult<Option<Record>>;

    /// Inserts or replaces a record.
    async fn put(&self, table_name: &str, record: Record) -> DalResult<()>;

    /// Reads several records by primary key.
    ///
    /// The backend may leave some keys unprocessed; callers resubmit them.
    async fn multi_get(&self, table_name: &str, keys: &[Record]) -> DalResult<MultiGetOutput>;

    /// Executes one query call.
    ///
    /// # Errors
    ///
    /// * `BackendError::DialectMismatch` - the filter was compiled for another dialect
    /// * `BackendError::EvaluationLimitExceeded` - the limit is above what the backend accepts
    /// * `BackendError::Transient` / `BackendError::Fatal` - backend failures
    async fn query(&self, request: StoreQuery) -> DalResult<QueryOutput>;

    /// Deletes a record by primary key. Returns `true` if it existed.
    async fn delete(&self, table_name: &str, key: &Record) -> DalResult<bool>;

    /// Builds the native continuation that resumes strictly after `last_key`.
    ///
    /// `last_key` holds the table keys and the index keys of the last record
    /// the caller consumed. Last-key backends use it verbatim.
    fn resume_after(&self, filter: &CompiledFilter, last_key: Record) -> DalResult<NativeContinuation> {
        let _ = filter;
        Ok(NativeContinuation::LastKey(last_key))
    }

    /// Rejects filters compiled for a different dialect.
    fn check_dialect(&self, filter: &CompiledFilter) -> DalResult<()> {
        if filter.dialect() == self.dialect() {
            Ok(())
        } else {
            Err(BackendError::DialectMismatch {
                backend_name: self.backend_name().to_string(),
                expected: self.dialect().to_string(),
                actual: filter.dialect().to_string(),
            }
            .into())
        }
    }
}
