//! In-memory record store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde_json::Value;

use super::document::matches_document;
use super::infix::{Bindings, Expr, parse_condition, parse_paths, parse_select};
use crate::compiler::{CompiledFilter, Dialect, LimitSemantics, NativeFilter};
use crate::core::{MultiGetOutput, QueryOutput, RecordStore, StoreQuery};
use crate::error::{BackendError, DalError, DalResult};
use crate::marshal::{AttributeMarshaller, Marshaller};
use crate::types::value::{compare_values, project};
use crate::types::{FieldPath, NativeContinuation, Record, TableDescriptor};

const BACKEND_NAME: &str = "memory";

/// Counters of the calls a [`MemoryStore`] has served.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStats {
    /// Number of query calls, including failed ones.
    pub query_calls: usize,
    /// The limit of every query call, in order.
    pub query_limits: Vec<u32>,
    /// Number of multi-get calls, including failed ones.
    pub multi_get_calls: usize,
    /// The number of keys of every multi-get call, in order.
    pub multi_get_sizes: Vec<usize>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_queries: BTreeSet<usize>,
    failing_multi_gets: BTreeSet<usize>,
    evaluation_ceiling: Option<u32>,
    deferred_keys: VecDeque<usize>,
}

#[derive(Debug)]
struct MemoryTable {
    descriptor: TableDescriptor,
    records: BTreeMap<String, Record>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    faults: Faults,
    stats: MemoryStats,
}

/// An in-process store that executes compiled queries of one dialect.
///
/// Query text is parsed and evaluated the way the real backend would:
/// per-call limits follow the dialect's limit semantics, secondary indexes
/// are sparse, and continuations are last keys or opaque tokens.
///
/// Failures can be injected to exercise retry and partial-result paths.
///
/// # Example
///
/// ```
/// use helios_dal::backends::memory::MemoryStore;
/// use helios_dal::compiler::Dialect;
/// use helios_dal::types::{KeySchema, TableDescriptor};
///
/// let store = MemoryStore::new(Dialect::Statement)
///     .with_table(TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId"));
/// store.fail_query(1);
/// assert_eq!(store.stats().query_calls, 0);
/// ```
pub struct MemoryStore {
    dialect: Dialect,
    marshaller: AttributeMarshaller,
    state: Mutex<State>,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("dialect", &self.dialect)
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Creates an empty store speaking `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            marshaller: AttributeMarshaller,
            state: Mutex::new(State::default()),
        }
    }

    /// Declares a table.
    pub fn with_table(self, descriptor: TableDescriptor) -> Self {
        self.create_table(descriptor);
        self
    }

    /// Declares a table, replacing any table of the same name.
    pub fn create_table(&self, descriptor: TableDescriptor) {
        let name = descriptor.table_name.clone();
        self.state.lock().tables.insert(
            name,
            MemoryTable {
                descriptor,
                records: BTreeMap::new(),
            },
        );
    }

    /// Removes a table; later calls against it fail fatally.
    pub fn drop_table(&self, table_name: &str) {
        self.state.lock().tables.remove(table_name);
    }

    /// Number of records stored in a table.
    pub fn record_count(&self, table_name: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table_name)
            .map_or(0, |t| t.records.len())
    }

    /// Makes the `call`-th query call (1-based, counted from creation) fail transiently.
    pub fn fail_query(&self, call: usize) {
        self.state.lock().faults.failing_queries.insert(call);
    }

    /// Makes the `call`-th multi-get call (1-based) fail transiently.
    pub fn fail_multi_get(&self, call: usize) {
        self.state.lock().faults.failing_multi_gets.insert(call);
    }

    /// Rejects query calls whose limit exceeds `ceiling`.
    pub fn set_evaluation_ceiling(&self, ceiling: u32) {
        self.state.lock().faults.evaluation_ceiling = Some(ceiling);
    }

    /// Leaves keys unprocessed: the n-th following multi-get call defers the
    /// last `counts[n]` keys of its request.
    pub fn defer_keys(&self, counts: impl IntoIterator<Item = usize>) {
        self.state.lock().faults.deferred_keys.extend(counts);
    }

    /// Returns the call counters.
    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats.clone()
    }

    fn prepare(&self, native: &NativeFilter) -> DalResult<Prepared> {
        let prepared = match native {
            NativeFilter::Expression(query) => {
                let bindings = Bindings {
                    names: query.expression_attribute_names.clone(),
                    named: query
                        .expression_attribute_values
                        .iter()
                        .map(|(alias, attr)| -> DalResult<(String, Value)> {
                            Ok((alias.clone(), self.marshaller.unmarshal(attr)?))
                        })
                        .collect::<DalResult<_>>()?,
                    positional: Vec::new(),
                };
                let condition = |text: &Option<String>| -> DalResult<Option<Matcher>> {
                    text.as_deref()
                        .map(|t| parse_condition(t, &bindings).map(Matcher::Infix))
                        .transpose()
                        .map_err(malformed)
                };
                Prepared {
                    key: condition(&query.key_condition_expression)?,
                    filter: condition(&query.filter_expression)?,
                    projection: query
                        .projection_expression
                        .as_deref()
                        .map(|t| parse_paths(t, &bindings))
                        .transpose()
                        .map_err(malformed)?,
                }
            }
            NativeFilter::Selector(query) => {
                let bindings = Bindings {
                    named: query
                        .parameters
                        .iter()
                        .map(|p| (p.name.clone(), p.value.clone()))
                        .collect(),
                    ..Default::default()
                };
                let select = parse_select(&query.query, &bindings).map_err(malformed)?;
                Prepared {
                    key: None,
                    filter: select.condition.map(Matcher::Infix),
                    projection: select.projection,
                }
            }
            NativeFilter::Statement(query) => {
                let bindings = Bindings {
                    positional: query
                        .parameters
                        .iter()
                        .map(|attr| self.marshaller.unmarshal(attr))
                        .collect::<DalResult<_>>()?,
                    ..Default::default()
                };
                let select = parse_select(&query.statement, &bindings).map_err(malformed)?;
                Prepared {
                    key: None,
                    filter: select.condition.map(Matcher::Infix),
                    projection: select.projection,
                }
            }
            NativeFilter::Document(query) => {
                let projection = match &query.projection {
                    Some(Value::Object(fields)) => Some(
                        fields
                            .keys()
                            .map(|dotted| FieldPath::parse(dotted).map_err(malformed))
                            .collect::<DalResult<Vec<_>>>()?,
                    ),
                    _ => None,
                };
                Prepared {
                    key: None,
                    filter: Some(Matcher::Document(query.filter.clone())),
                    projection,
                }
            }
        };
        Ok(prepared)
    }

    fn begin_query(&self, state: &mut State, limit: u32) -> DalResult<()> {
        state.stats.query_calls += 1;
        state.stats.query_limits.push(limit);
        if state.faults.failing_queries.remove(&state.stats.query_calls) {
            return Err(BackendError::transient(BACKEND_NAME, "injected query failure").into());
        }
        if let Some(ceiling) = state.faults.evaluation_ceiling
            && limit > ceiling
        {
            return Err(BackendError::EvaluationLimitExceeded {
                backend_name: BACKEND_NAME.to_string(),
                limit,
            }
            .into());
        }
        Ok(())
    }

    fn encode_token(key: &Record) -> String {
        let json = serde_json::to_vec(key).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn continuation_key(continuation: &NativeContinuation) -> DalResult<Record> {
        match continuation {
            NativeContinuation::LastKey(key) => Ok(key.clone()),
            NativeContinuation::Token(token) => URL_SAFE_NO_PAD
                .decode(token)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<Record>(&bytes).ok())
                .ok_or_else(|| BackendError::fatal(BACKEND_NAME, "invalid continuation token").into()),
        }
    }
}

struct Prepared {
    key: Option<Matcher>,
    filter: Option<Matcher>,
    projection: Option<Vec<FieldPath>>,
}

enum Matcher {
    Infix(Expr),
    Document(Value),
}

impl Matcher {
    fn test(&self, record: &Record) -> DalResult<bool> {
        match self {
            Matcher::Infix(expr) => Ok(expr.eval(record)),
            Matcher::Document(filter) => matches_document(filter, record).map_err(malformed),
        }
    }
}

fn test_all(matcher: Option<&Matcher>, record: &Record) -> DalResult<bool> {
    matcher.map_or(Ok(true), |m| m.test(record))
}

fn malformed(source: impl std::error::Error + Send + Sync + 'static) -> DalError {
    BackendError::Fatal {
        backend_name: BACKEND_NAME.to_string(),
        message: "malformed query".to_string(),
        source: Some(Box::new(source)),
    }
    .into()
}

fn table_missing(table_name: &str) -> DalError {
    BackendError::fatal(BACKEND_NAME, format!("table '{}' not found", table_name)).into()
}

impl MemoryTable {
    /// Order of records within the addressed index: index keys, then table keys.
    fn order_fields(&self, index_name: Option<&str>) -> DalResult<(Vec<String>, usize)> {
        let table_keys = self.descriptor.primary_key.fields();
        let mut fields: Vec<String> = Vec::new();
        let mut required = 0;
        if let Some(name) = index_name {
            let index = self
                .descriptor
                .index(name)
                .map_err(|e| BackendError::fatal(BACKEND_NAME, e.to_string()))?;
            for field in index.key_fields() {
                fields.push(field.to_string());
            }
            required = fields.len();
        }
        for field in table_keys {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        Ok((fields, required))
    }

    fn storage_key(&self, key: &Record) -> DalResult<String> {
        let values = self
            .descriptor
            .primary_key
            .fields()
            .into_iter()
            .map(|field| {
                key.get(field).cloned().ok_or_else(|| {
                    BackendError::fatal(
                        BACKEND_NAME,
                        format!("key of table '{}' is missing '{}'", self.descriptor.table_name, field),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_string(&values)?)
    }
}

fn order_key(record: &Record, fields: &[String]) -> Vec<Value> {
    fields
        .iter()
        .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_keys(left: &[Value], right: &[Value]) -> Ordering {
    left.iter()
        .zip(right)
        .map(|(a, b)| compare_values(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b))))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn key_of(record: &Record, fields: &[String]) -> Record {
    let paths: Vec<FieldPath> = fields.iter().map(|f| FieldPath::key(f.clone())).collect();
    project(record, &paths)
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn get(&self, table_name: &str, key: &Record) -> DalResult<Option<Record>> {
        let state = self.state.lock();
        let table = state.tables.get(table_name).ok_or_else(|| table_missing(table_name))?;
        let storage_key = table.storage_key(key)?;
        Ok(table.records.get(&storage_key).cloned())
    }

    async fn put(&self, table_name: &str, record: Record) -> DalResult<()> {
        let mut state = self.state.lock();
        let table = state
            .tables
            .get_mut(table_name)
            .ok_or_else(|| table_missing(table_name))?;
        let storage_key = table.storage_key(&record)?;
        table.records.insert(storage_key, record);
        Ok(())
    }

    async fn multi_get(&self, table_name: &str, keys: &[Record]) -> DalResult<MultiGetOutput> {
        let mut state = self.state.lock();
        state.stats.multi_get_calls += 1;
        state.stats.multi_get_sizes.push(keys.len());
        let call = state.stats.multi_get_calls;
        if state.faults.failing_multi_gets.remove(&call) {
            return Err(BackendError::transient(BACKEND_NAME, "injected multi-get failure").into());
        }
        let deferred = state.faults.deferred_keys.pop_front().unwrap_or(0).min(keys.len());

        let table = state.tables.get(table_name).ok_or_else(|| table_missing(table_name))?;
        let (processed, unprocessed) = keys.split_at(keys.len() - deferred);
        let mut items = Vec::with_capacity(processed.len());
        for key in processed {
            if let Some(record) = table.records.get(&table.storage_key(key)?) {
                items.push(record.clone());
            }
        }
        Ok(MultiGetOutput {
            items,
            unprocessed_keys: unprocessed.to_vec(),
        })
    }

    async fn query(&self, request: StoreQuery) -> DalResult<QueryOutput> {
        self.check_dialect(&request.filter)?;
        let prepared = self.prepare(&request.filter.native)?;
        let resume = request
            .continuation
            .as_ref()
            .map(Self::continuation_key)
            .transpose()?;

        let mut state = self.state.lock();
        self.begin_query(&mut state, request.limit)?;

        let filter = &request.filter;
        let table = state
            .tables
            .get(&filter.table_name)
            .ok_or_else(|| table_missing(&filter.table_name))?;
        let (fields, required) = table.order_fields(filter.index_name.as_deref())?;

        // Sparse index: records without every index key are not in it.
        let mut rows: Vec<(Vec<Value>, &Record)> = table
            .records
            .values()
            .filter(|record| fields[..required].iter().all(|f| record.contains_key(f)))
            .map(|record| (order_key(record, &fields), record))
            .collect();
        rows.sort_by(|a, b| compare_keys(&a.0, &b.0));
        let ascending = filter.direction.is_ascending();
        if !ascending {
            rows.reverse();
        }
        if let Some(last) = &resume {
            let last = order_key(last, &fields);
            rows.retain(|(key, _)| {
                let order = compare_keys(key, &last);
                if ascending {
                    order == Ordering::Greater
                } else {
                    order == Ordering::Less
                }
            });
        }

        let mut candidates = Vec::with_capacity(rows.len());
        for (_, record) in rows {
            if test_all(prepared.key.as_ref(), record)? {
                candidates.push(record);
            }
        }

        let limit = request.limit.max(1) as usize;
        let shape = |record: &Record| match &prepared.projection {
            Some(paths) => project(record, paths),
            None => record.clone(),
        };

        let mut items = Vec::new();
        let continuation = match self.dialect.limit_semantics() {
            LimitSemantics::Evaluated => {
                let scanned = &candidates[..limit.min(candidates.len())];
                for &record in scanned {
                    if test_all(prepared.filter.as_ref(), record)? {
                        items.push(shape(record));
                    }
                }
                match scanned.last() {
                    Some(last) if scanned.len() == limit => {
                        Some(NativeContinuation::LastKey(key_of(last, &fields)))
                    }
                    _ => None,
                }
            }
            LimitSemantics::Returned => {
                let mut last_returned = None;
                for (position, &record) in candidates.iter().enumerate() {
                    if items.len() == limit {
                        break;
                    }
                    if test_all(prepared.filter.as_ref(), record)? {
                        items.push(shape(record));
                        last_returned = Some((position, record));
                    }
                }
                match last_returned {
                    Some((position, last)) if items.len() == limit && position + 1 < candidates.len() => {
                        Some(NativeContinuation::Token(Self::encode_token(&key_of(last, &fields))))
                    }
                    _ => None,
                }
            }
        };

        tracing::trace!(
            table = %filter.table_name,
            index = ?filter.index_name,
            limit = request.limit,
            returned = items.len(),
            more = continuation.is_some(),
            "Served memory query"
        );
        Ok(QueryOutput { items, continuation })
    }

    async fn delete(&self, table_name: &str, key: &Record) -> DalResult<bool> {
        let mut state = self.state.lock();
        let table = state
            .tables
            .get_mut(table_name)
            .ok_or_else(|| table_missing(table_name))?;
        let storage_key = table.storage_key(key)?;
        Ok(table.records.remove(&storage_key).is_some())
    }

    fn resume_after(&self, _filter: &CompiledFilter, last_key: Record) -> DalResult<NativeContinuation> {
        Ok(match self.dialect.limit_semantics() {
            LimitSemantics::Evaluated => NativeContinuation::LastKey(last_key),
            LimitSemantics::Returned => NativeContinuation::Token(Self::encode_token(&last_key)),
        })
    }
}
