//! Test harness infrastructure for dialect testing.
//!
//! This module provides the [`TestContext`] struct, which wires a
//! [`Repository`] to an in-memory store speaking one dialect, and helpers to
//! seed it and walk its pages.

use std::sync::Arc;

use helios_dal::backends::memory::MemoryStore;
use helios_dal::compiler::Dialect;
use helios_dal::config::DalConfig;
use helios_dal::core::SharedStore;
use helios_dal::repository::{IndexQuery, Repository};
use helios_dal::tenant::{TenantContext, TenantId};
use helios_dal::types::Record;

use super::fixtures::{OrderFixture, orders_table};

/// Context for running tests against one dialect.
pub struct TestContext {
    /// The repository under test.
    pub repo: Repository,
    /// The store behind it, for fault injection and call counters.
    pub store: Arc<MemoryStore>,
}

impl TestContext {
    /// Creates a context with the default configuration.
    pub fn new(dialect: Dialect) -> Self {
        Self::with_config(dialect, DalConfig::default())
    }

    /// Creates a context with `config`.
    pub fn with_config(dialect: Dialect, config: DalConfig) -> Self {
        let store = Arc::new(MemoryStore::new(dialect).with_table(orders_table()));
        let repo = Repository::new(orders_table(), SharedStore::connected(store.clone()), config)
            .expect("Invalid test configuration");
        Self { repo, store }
    }

    /// Saves every fixture as its own tenant.
    pub async fn seed(&self, fixtures: &[OrderFixture]) {
        for fixture in fixtures {
            self.repo
                .save(&tenant(&fixture.tenant), fixture.to_record())
                .await
                .expect("Failed to seed fixture");
        }
    }

    /// Follows `nextPageHash` from the first page until it is absent.
    ///
    /// Panics if the walk does not end within `max_pages`.
    pub async fn all_pages(&self, ctx: &TenantContext, query: &IndexQuery, max_pages: usize) -> Vec<Vec<Record>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..max_pages {
            let page = self
                .repo
                .query_by_index_paginated(ctx, query, cursor.as_deref())
                .await
                .expect("Failed to fetch page");
            assert!(!page.page_info.partial, "unexpected partial page");
            cursor = page.next_page_hash().map(str::to_string);
            pages.push(page.items);
            if cursor.is_none() {
                return pages;
            }
        }
        panic!("pagination did not terminate within {} pages", max_pages);
    }
}

/// Creates a tenant context.
pub fn tenant(id: &str) -> TenantContext {
    TenantContext::new(TenantId::new(id))
}

/// Extracts the ids of `records`, in order.
pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["id"].as_str().expect("record without id").to_string())
        .collect()
}

/// Ids of the fixtures matching `predicate`, in index order (by `createdAt`, then `id`).
pub fn expected_ids(fixtures: &[OrderFixture], predicate: impl Fn(&OrderFixture) -> bool) -> Vec<String> {
    let mut matching: Vec<&OrderFixture> = fixtures.iter().filter(|f| predicate(f)).collect();
    matching.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));
    matching.into_iter().map(|f| f.id.clone()).collect()
}
