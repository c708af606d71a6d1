//! Helios Data-Access Layer
//!
//! This crate provides one filter DSL and one paging model on top of record
//! stores with very different native query languages. A query is written once
//! as a JSON field map, validated into a condition AST, scoped to the
//! caller's tenant, and compiled for the dialect of the configured store.
//!
//! # Features
//!
//! - **One DSL, four dialects**: key-condition expressions, operator
//!   documents, SQL-like selectors and positional statements
//! - **Tenant isolation**: every indexed query carries an exact-match tenant
//!   constraint; batch reads drop foreign records
//! - **Logical pagination**: fixed-size pages with opaque cursors, whatever
//!   the backend's own limit and continuation semantics
//! - **Batch retrieval**: de-duplicated, chunked multi-get with bounded
//!   unprocessed-key retries
//!
//! # Backend Features
//!
//! - `memory` (default) - in-process emulator for every dialect
//!
//! # Architecture
//!
//! - [`query`] - condition AST, parser and in-process evaluator
//! - [`compiler`] - the [`FilterCompiler`](compiler::FilterCompiler) trait and one compiler per dialect
//! - [`index`] - secondary index resolution and tenant scoping
//! - [`engine`] - pagination and batch loops
//! - [`core`] - the [`RecordStore`](core::RecordStore) boundary and shared handles
//! - [`repository`] - the caller-facing facade
//! - [`backends`] - store implementations
//! - [`tenant`], [`types`], [`config`], [`marshal`], [`validate`], [`error`]
//!
//! # Quick Start
//!
//! ```
//! use helios_dal::compiler::Dialect;
//! use helios_dal::repository::{IndexQuery, compiler_for_table, plan_index_query};
//! use helios_dal::tenant::TenantId;
//! use helios_dal::types::{KeySchema, SecondaryIndexDescriptor, TableDescriptor};
//! use serde_json::json;
//!
//! let table = TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
//!     .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"));
//!
//! let query = IndexQuery::new("byStatus", "open")
//!     .with_filter_json(&json!({"amount": {"between": [100, 500]}}))
//!     .unwrap();
//! let plan = plan_index_query(&table, &TenantId::new("acme"), &query).unwrap();
//!
//! for dialect in Dialect::ALL {
//!     let compiled = compiler_for_table(dialect, &table).compile(&plan, None).unwrap();
//!     println!("{}: {}", dialect, serde_json::to_string(&compiled.native).unwrap());
//! }
//! ```
//!
//! # Multitenancy
//!
//! All repository operations require a [`TenantContext`](tenant::TenantContext).
//! There is no way to query without one.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod compiler;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod index;
pub mod marshal;
pub mod query;
pub mod repository;
pub mod tenant;
pub mod types;
pub mod validate;

// Re-export commonly used types at crate root
pub use compiler::{CompiledFilter, Dialect, FilterCompiler};
pub use config::DalConfig;
pub use error::{DalError, DalResult};
pub use repository::{IndexQuery, Repository};
pub use tenant::{TenantContext, TenantId};
pub use types::{Page, PagingCursor, Record, TableDescriptor};

// Re-export core traits
pub use core::{RecordStore, SharedStore, StoreConnector};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
