//! Server-side resume points.
//!
//! When a page ends inside a backend page, the native continuation that
//! resumes after it is remembered here under the tenant, the compiled query
//! and the next cursor's `(pageNo, limit)`. The caller only ever holds that
//! logical cursor. A lookup that misses (evicted, another process, a cursor
//! built by hand) is served by skip-scan, so entries are an optimisation and
//! never change which records a page holds.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::compiler::CompiledFilter;
use crate::tenant::TenantId;
use crate::types::{NativeContinuation, PagingCursor};

/// Identifies one logical page of one query for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeKey {
    tenant: TenantId,
    query: String,
    page_no: u32,
    limit: u32,
}

impl ResumeKey {
    /// Builds the key of the page `cursor` names. `None` if the query
    /// cannot be fingerprinted.
    pub fn new(tenant: &TenantId, filter: &CompiledFilter, cursor: &PagingCursor) -> Option<Self> {
        let query = serde_json::to_string(filter).ok()?;
        Some(Self {
            tenant: tenant.clone(),
            query,
            page_no: cursor.page_no,
            limit: cursor.limit,
        })
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeStats {
    /// Lookups that found a resume point.
    pub hits: u64,
    /// Lookups served by skip-scan.
    pub misses: u64,
    /// Entries held.
    pub size: usize,
}

#[derive(Debug, Default)]
struct Entries {
    points: HashMap<ResumeKey, NativeContinuation>,
    order: VecDeque<ResumeKey>,
    hits: u64,
    misses: u64,
}

/// A bounded map of resume points; the oldest entry is evicted first.
///
/// A capacity of 0 disables it and every page after the first is served by
/// skip-scan.
#[derive(Debug)]
pub struct ResumePoints {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl ResumePoints {
    /// Creates an empty map holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Returns the resume point stored for `key`.
    pub fn get(&self, key: &ResumeKey) -> Option<NativeContinuation> {
        let mut entries = self.entries.lock();
        let found = entries.points.get(key).cloned();
        if found.is_some() {
            entries.hits += 1;
        } else {
            entries.misses += 1;
        }
        found
    }

    /// Remembers `resume` for `key`.
    pub fn insert(&self, key: ResumeKey, resume: NativeContinuation) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.points.insert(key.clone(), resume).is_some() {
            return;
        }
        entries.order.push_back(key);
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.points.remove(&oldest);
            }
        }
    }

    /// Current counters.
    pub fn stats(&self) -> ResumeStats {
        let entries = self.entries.lock();
        ResumeStats {
            hits: entries.hits,
            misses: entries.misses,
            size: entries.points.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Dialect, KeyPart, QueryPlan, compiler_for};
    use crate::query::FieldCondition;

    fn filter(status: &str) -> CompiledFilter {
        let plan = QueryPlan::new("orders")
            .with_index("byStatus")
            .with_key(KeyPart::new(FieldCondition::eq("status", status).unwrap()));
        compiler_for(Dialect::Expression).compile(&plan, None).unwrap()
    }

    fn key(tenant: &str, status: &str, page_no: u32) -> ResumeKey {
        ResumeKey::new(&TenantId::new(tenant), &filter(status), &PagingCursor::new(page_no, 10)).unwrap()
    }

    fn token(s: &str) -> NativeContinuation {
        NativeContinuation::Token(s.into())
    }

    #[test]
    fn test_lookup_is_scoped_to_tenant_query_and_page() {
        let points = ResumePoints::new(8);
        points.insert(key("t1", "open", 2), token("a"));

        assert_eq!(points.get(&key("t1", "open", 2)), Some(token("a")));
        assert_eq!(points.get(&key("t2", "open", 2)), None);
        assert_eq!(points.get(&key("t1", "closed", 2)), None);
        assert_eq!(points.get(&key("t1", "open", 3)), None);
        assert_eq!(
            points.stats(),
            ResumeStats {
                hits: 1,
                misses: 3,
                size: 1
            }
        );
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let points = ResumePoints::new(2);
        points.insert(key("t1", "open", 2), token("a"));
        points.insert(key("t1", "open", 3), token("b"));
        points.insert(key("t1", "open", 2), token("a2"));
        points.insert(key("t1", "open", 4), token("c"));

        assert_eq!(points.get(&key("t1", "open", 2)), None);
        assert_eq!(points.get(&key("t1", "open", 3)), Some(token("b")));
        assert_eq!(points.get(&key("t1", "open", 4)), Some(token("c")));
        assert_eq!(points.stats().size, 2);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let points = ResumePoints::new(0);
        points.insert(key("t1", "open", 2), token("a"));
        assert_eq!(points.get(&key("t1", "open", 2)), None);
    }
}
