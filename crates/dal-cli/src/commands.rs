//! Subcommand implementations.
//!
//! Every command returns the JSON document it prints, so the output can be
//! checked without capturing stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use helios_dal::backends::memory::MemoryStore;
use helios_dal::compiler::{Dialect, SortDirection};
use helios_dal::config::DalConfig;
use helios_dal::core::SharedStore;
use helios_dal::repository::{IndexQuery, Repository, compiler_for_table, plan_index_query};
use helios_dal::tenant::{TenantContext, TenantId};
use helios_dal::types::{FieldPath, PagingCursor, Record, TableDescriptor};

use crate::args::{CompileArgs, CursorCommand, QueryArgs, QuerySpec};

/// Contents of a table configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFile {
    /// The table and its indexes.
    pub table: TableDescriptor,
    /// Engine limits; `DAL_*` environment variables apply when absent.
    #[serde(default)]
    pub engine: Option<DalConfig>,
}

impl TableFile {
    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file = Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))?;
        info!(path = %path.display(), table = %file.table.table_name, "Loaded table configuration");
        Ok(file)
    }

    /// Parses and validates configuration text.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let file: TableFile = serde_json::from_str(text)?;
        let mut errors = Vec::new();
        if let Err(mut table_errors) = file.table.validate() {
            errors.append(&mut table_errors);
        }
        if let Err(mut engine_errors) = file.engine().validate() {
            errors.append(&mut engine_errors);
        }
        if !errors.is_empty() {
            bail!("{}", errors.join("; "));
        }
        Ok(file)
    }

    /// The engine configuration in effect.
    pub fn engine(&self) -> DalConfig {
        self.engine.clone().unwrap_or_else(DalConfig::from_env)
    }
}

/// Builds the library query from command-line pieces.
pub fn build_query(spec: &QuerySpec) -> anyhow::Result<IndexQuery> {
    let mut query = IndexQuery::new(spec.index.clone(), json_or_string(&spec.partition));
    if let Some(sort_key) = &spec.sort_key {
        query = query.with_sort_key(json_or_string(sort_key));
    }
    if let Some(filter) = &spec.filter {
        let filter: Value = serde_json::from_str(filter).context("filter is not valid JSON")?;
        query = query.with_filter_json(&filter)?;
    }
    if !spec.fields.is_empty() {
        let fields = spec
            .fields
            .iter()
            .map(|f| FieldPath::parse(f.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        query = query.with_fields(fields);
    }
    if spec.descending {
        query = query.with_direction(SortDirection::Descending);
    }
    if let Some(limit) = spec.limit {
        query = query.with_limit(limit);
    }
    Ok(query)
}

fn json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `dal compile`: the compiled query per dialect, keyed by dialect name.
pub fn compile(table: &TableDescriptor, args: &CompileArgs) -> anyhow::Result<Value> {
    let query = build_query(&args.query)?;
    let plan = plan_index_query(table, &TenantId::new(args.query.tenant.clone()), &query)?;
    let dialects: Vec<Dialect> = match args.dialect {
        Some(dialect) => vec![dialect],
        None => Dialect::ALL.to_vec(),
    };

    let mut out = Map::new();
    for dialect in dialects {
        let compiled = compiler_for_table(dialect, table).compile(&plan, query.fields())?;
        debug!(dialect = %dialect, "Compiled query");
        out.insert(dialect.to_string(), serde_json::to_value(&compiled)?);
    }
    Ok(Value::Object(out))
}

/// `dal query`: one page of results from an in-memory store.
pub async fn query(file: &TableFile, args: &QueryArgs) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(&args.data)
        .with_context(|| format!("failed to read data file {}", args.data.display()))?;
    let records: Vec<Record> = serde_json::from_str(&text).context("data file must hold an array of objects")?;
    run_query(file, args.dialect, &args.query, records, args.cursor.as_deref()).await
}

/// Seeds a fresh in-memory store with `records` and fetches one page.
///
/// Records are saved as the tenant they name, or as the query tenant when
/// they name none.
pub async fn run_query(
    file: &TableFile,
    dialect: Dialect,
    spec: &QuerySpec,
    records: Vec<Record>,
    cursor: Option<&str>,
) -> anyhow::Result<Value> {
    let table = &file.table;
    let store = MemoryStore::new(dialect).with_table(table.clone());
    let repo = Repository::new(table.clone(), SharedStore::connected(Arc::new(store)), file.engine())?;
    let ctx = TenantContext::new(TenantId::new(spec.tenant.clone()));

    let seeded = records.len();
    for record in records {
        let owner = match record.get(&table.tenant_field).and_then(Value::as_str) {
            Some(tenant) => TenantContext::new(TenantId::new(tenant)),
            None => ctx.clone(),
        };
        repo.save(&owner, record).await?;
    }
    info!(records = seeded, dialect = %dialect, "Seeded in-memory store");

    let query = build_query(spec)?;
    let page = repo.query_by_index_paginated(&ctx, &query, cursor).await?;
    Ok(serde_json::to_value(&page)?)
}

/// `dal cursor ...`.
pub fn cursor(command: &CursorCommand) -> anyhow::Result<Value> {
    match command {
        CursorCommand::Encode { page, limit } => {
            if *page == 0 || *limit == 0 {
                bail!("page and limit must be at least 1");
            }
            Ok(json!({"cursor": PagingCursor::new(*page, *limit).encode()}))
        }
        CursorCommand::Decode { cursor } => {
            let decoded = PagingCursor::decode(cursor);
            let readable = decoded.is_some();
            let cursor = decoded.unwrap_or_else(|| PagingCursor::first(helios_dal::types::DEFAULT_PAGE_SIZE));
            Ok(json!({"readable": readable, "cursor": cursor}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ConfigArgs;
    use std::path::PathBuf;

    const ORDERS: &str = r#"{
        "table": {
            "tableName": "orders",
            "primaryKey": {"partitionKey": "id"},
            "tenantField": "tenantId",
            "indexes": [
                {"indexName": "byStatus", "partitionKeyField": "status", "sortKeyField": "createdAt"},
                {"indexName": "byCustomer", "partitionKeyField": "customerId"}
            ]
        },
        "engine": {"pagination": {"defaultPageSize": 2}}
    }"#;

    fn spec(index: &str, partition: &str) -> QuerySpec {
        QuerySpec {
            tenant: "acme".into(),
            index: index.into(),
            partition: partition.into(),
            sort_key: None,
            filter: None,
            fields: vec![],
            descending: false,
            limit: None,
        }
    }

    fn compile_args(query: QuerySpec, dialect: Option<Dialect>) -> CompileArgs {
        CompileArgs {
            config: ConfigArgs {
                config: PathBuf::from("orders.json"),
            },
            query,
            dialect,
        }
    }

    #[test]
    fn test_parse_table_file() {
        let file = TableFile::parse(ORDERS).unwrap();
        assert_eq!(file.table.indexes.len(), 2);
        assert_eq!(file.engine().pagination.default_page_size, 2);
        assert_eq!(file.engine().batch.max_batch_size, 100);
    }

    #[test]
    fn test_invalid_table_file() {
        let text = r#"{"table": {"tableName": "", "primaryKey": {"partitionKey": "id"}, "tenantField": "t"}}"#;
        let err = TableFile::parse(text).unwrap_err();
        assert!(err.to_string().contains("table name"));
    }

    #[test]
    fn test_compile_every_dialect() {
        let file = TableFile::parse(ORDERS).unwrap();
        let mut query = spec("byCustomer", "c-1");
        query.filter = Some(r#"{"status": "open", "amount": {"between": [100, 500]}}"#.into());

        let out = compile(&file.table, &compile_args(query, None)).unwrap();
        let out = out.as_object().unwrap();
        assert_eq!(out.len(), 4);
        let statement = out["statement"]["native"]["statement"].as_str().unwrap();
        assert!(statement.contains(r#""tenantId" = ?"#), "{}", statement);
        assert!(statement.contains(r#""amount" BETWEEN ? AND ?"#), "{}", statement);
    }

    #[test]
    fn test_compile_single_dialect() {
        let file = TableFile::parse(ORDERS).unwrap();
        let out = compile(&file.table, &compile_args(spec("byStatus", "open"), Some(Dialect::Selector))).unwrap();
        let query = out["selector"]["native"]["query"].as_str().unwrap();
        assert!(query.starts_with(r#"SELECT * FROM c WHERE c["status"] = @p0"#), "{}", query);
    }

    #[test]
    fn test_compile_unknown_index() {
        let file = TableFile::parse(ORDERS).unwrap();
        let err = compile(&file.table, &compile_args(spec("byNothing", "x"), None)).unwrap_err();
        assert!(err.to_string().contains("byNothing"));
    }

    #[test]
    fn test_partition_value_parsing() {
        assert_eq!(json_or_string("open"), json!("open"));
        assert_eq!(json_or_string("42"), json!(42));
        assert_eq!(json_or_string(r#""42""#), json!("42"));
    }

    #[tokio::test]
    async fn test_run_query_pages() {
        let file = TableFile::parse(ORDERS).unwrap();
        let records: Vec<Record> = (1..=3)
            .map(|i| {
                json!({"id": format!("o-{}", i), "status": "open", "createdAt": format!("2024-0{}", i)})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .chain(std::iter::once(
                json!({"id": "x-1", "status": "open", "createdAt": "2024-00", "tenantId": "globex"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            ))
            .collect();

        let page = run_query(&file, Dialect::Document, &spec("byStatus", "open"), records.clone(), None)
            .await
            .unwrap();
        let ids: Vec<&str> = page["items"].as_array().unwrap().iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["o-1", "o-2"]);

        let next = page["pageInfo"]["nextPageHash"].as_str().unwrap().to_string();
        let page = run_query(&file, Dialect::Document, &spec("byStatus", "open"), records, Some(&next))
            .await
            .unwrap();
        assert_eq!(page["items"][0]["id"], "o-3");
        assert!(page["pageInfo"]["nextPageHash"].is_null());
    }

    #[test]
    fn test_cursor_commands() {
        let encoded = cursor(&CursorCommand::Encode { page: 3, limit: 25 }).unwrap();
        let raw = encoded["cursor"].as_str().unwrap().to_string();

        let decoded = cursor(&CursorCommand::Decode { cursor: raw }).unwrap();
        assert_eq!(decoded["readable"], true);
        assert_eq!(decoded["cursor"], json!({"pageNo": 3, "limit": 25}));

        let garbage = cursor(&CursorCommand::Decode { cursor: "%%%".into() }).unwrap();
        assert_eq!(garbage["readable"], false);
        assert_eq!(garbage["cursor"]["pageNo"], 1);

        assert!(cursor(&CursorCommand::Encode { page: 0, limit: 5 }).is_err());
    }
}
