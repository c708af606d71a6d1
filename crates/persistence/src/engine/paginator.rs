//! The pagination loop.
//!
//! One [`Paginator::page`] call serves one logical page. It issues backend
//! calls one after another, each with the per-call evaluation limit and the
//! continuation of the previous call, until it holds one record more than the
//! page needs or the backend runs out of data. The extra record proves that a
//! next page exists without a second round trip.
//!
//! The per-call limit adapts: it doubles (up to the configured ceiling) when a
//! backend page comes back empty but unfinished, and halves when the backend
//! rejects it.
//!
//! Cursors only name `(pageNo, limit)`. With [`ResumePoints`] attached, the
//! native continuation after each handed-out page is kept on the server and a
//! later request for that page seeks to it; otherwise the page is found by
//! skipping the matches of the preceding pages.

use crate::compiler::CompiledFilter;
use crate::config::PaginationConfig;
use crate::core::{RecordStore, StoreQuery};
use crate::error::{BackendError, DalError, DalResult};
use crate::tenant::TenantContext;
use crate::types::value::project;
use crate::types::{FieldPath, KeySchema, NativeContinuation, Page, PageInfo, PagingCursor, Record};

use super::last_key;
use super::resume::{ResumeKey, ResumePoints};

/// A compiled query ready for the pagination loop.
///
/// The filter's projection must include `resume_fields`; the loop strips them
/// again when the caller asked for `projection`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    /// The compiled query.
    pub filter: CompiledFilter,
    /// Primary key of the table, for re-reading records.
    pub primary_key: KeySchema,
    /// Fields of a resume key: table keys and index keys.
    pub resume_fields: Vec<String>,
    /// Fields the caller asked for, if restricted.
    pub projection: Option<Vec<FieldPath>>,
}

impl ScanRequest {
    fn shape(&self, items: Vec<Record>) -> Vec<Record> {
        match &self.projection {
            Some(paths) => items.iter().map(|item| project(item, paths)).collect(),
            None => items,
        }
    }
}

/// Items accumulated by one run of the loop.
struct Scan {
    items: Vec<Record>,
    /// The run ended early on a transient error or cancellation.
    interrupted: bool,
}

/// Drives the accumulation loop against one store.
pub struct Paginator<'a> {
    store: &'a dyn RecordStore,
    config: &'a PaginationConfig,
    resume_points: Option<&'a ResumePoints>,
    debug_logging: bool,
}

impl<'a> Paginator<'a> {
    /// Creates a paginator.
    pub fn new(store: &'a dyn RecordStore, config: &'a PaginationConfig) -> Self {
        Self {
            store,
            config,
            resume_points: None,
            debug_logging: false,
        }
    }

    /// Remembers resume points between pages in `points`.
    pub fn with_resume_points(mut self, points: &'a ResumePoints) -> Self {
        self.resume_points = Some(points);
        self
    }

    /// Emits a debug event per backend call.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Serves the logical page `cursor` points at.
    ///
    /// A page whose resume point is remembered seeks to it; any other page
    /// is served by skipping the matches of the preceding pages.
    ///
    /// # Errors
    ///
    /// Backend errors propagate unless some items were already accumulated,
    /// in which case the page is returned marked partial and without a next
    /// cursor. Cancellation behaves the same way, with
    /// [`DalError::Cancelled`] when nothing was accumulated.
    pub async fn page(&self, ctx: &TenantContext, request: &ScanRequest, cursor: PagingCursor) -> DalResult<Page<Record>> {
        let page_size = cursor.limit as usize;
        let (start, skip) = match self.remembered(ctx, request, &cursor) {
            Some(resume) => (Some(resume), 0),
            None => (None, cursor.offset()),
        };

        let scan = self
            .scan(ctx, request, cursor.limit, Some(page_size + 1), start, skip)
            .await?;
        let mut items = scan.items;
        let has_next = items.len() > page_size;
        items.truncate(page_size);

        let info = if scan.interrupted {
            tracing::warn!(
                table = %request.filter.table_name,
                page = cursor.page_no,
                returned = items.len(),
                "Returning partial page"
            );
            PageInfo::end(cursor.page_no, cursor.limit).partial()
        } else if let Some(next) = cursor.next().filter(|_| has_next) {
            if let Some(last) = items.last() {
                self.remember(ctx, request, &next, last).await;
            }
            PageInfo::with_next(cursor.page_no, cursor.limit, &next)
        } else {
            PageInfo::end(cursor.page_no, cursor.limit)
        };

        Ok(Page::new(request.shape(items), info))
    }

    /// Collects every match, or the first `limit` of them. Never emits a cursor.
    ///
    /// Interruptions follow the same partial-result rule as [`page`](Self::page).
    pub async fn collect(&self, ctx: &TenantContext, request: &ScanRequest, limit: Option<u32>) -> DalResult<Vec<Record>> {
        let size_hint = limit.unwrap_or(self.config.default_page_size);
        let scan = self
            .scan(ctx, request, size_hint, limit.map(|l| l as usize), None, 0)
            .await?;
        let mut items = scan.items;
        if let Some(limit) = limit {
            items.truncate(limit as usize);
        }
        if scan.interrupted {
            tracing::warn!(
                table = %request.filter.table_name,
                returned = items.len(),
                "Returning partial result"
            );
        }
        Ok(request.shape(items))
    }

    async fn scan(
        &self,
        ctx: &TenantContext,
        request: &ScanRequest,
        page_size: u32,
        want: Option<usize>,
        start: Option<NativeContinuation>,
        mut skip: u64,
    ) -> DalResult<Scan> {
        let mut limit = self.config.evaluation_limit(page_size);
        let mut ceiling = self.config.evaluation_ceiling(page_size);
        let mut continuation = start;
        let mut items: Vec<Record> = Vec::new();

        loop {
            if ctx.is_cancelled() {
                return interrupt(items, DalError::Cancelled);
            }

            let query = StoreQuery {
                filter: request.filter.clone(),
                limit,
                continuation: continuation.clone(),
            };
            let output = match self.store.query(query).await {
                Ok(output) => output,
                Err(DalError::Backend(BackendError::EvaluationLimitExceeded { .. })) if limit > 1 => {
                    ceiling = ceiling.min(limit - 1);
                    let rejected = limit;
                    limit = (limit / 2).max(1);
                    tracing::warn!(rejected, limit, "Backend rejected evaluation limit, retrying lower");
                    continue;
                }
                Err(e) => return interrupt(items, e),
            };

            let returned = output.items.len();
            for item in output.items {
                if skip > 0 {
                    skip -= 1;
                } else {
                    items.push(item);
                }
            }
            continuation = output.continuation;

            if self.debug_logging {
                tracing::debug!(
                    table = %request.filter.table_name,
                    index = ?request.filter.index_name,
                    limit,
                    returned,
                    accumulated = items.len(),
                    more = continuation.is_some(),
                    "Pagination backend call"
                );
            }

            let satisfied = want.is_some_and(|want| items.len() >= want);
            if satisfied || continuation.is_none() {
                return Ok(Scan {
                    items,
                    interrupted: false,
                });
            }
            if returned == 0 && limit < ceiling {
                limit = limit.saturating_mul(2).min(ceiling);
            }
        }
    }

    fn remembered(&self, ctx: &TenantContext, request: &ScanRequest, cursor: &PagingCursor) -> Option<NativeContinuation> {
        if cursor.page_no == 1 {
            return None;
        }
        let points = self.resume_points?;
        points.get(&ResumeKey::new(ctx.tenant_id(), &request.filter, cursor)?)
    }

    async fn remember(&self, ctx: &TenantContext, request: &ScanRequest, next: &PagingCursor, last: &Record) {
        let Some(points) = self.resume_points else {
            return;
        };
        let Some(key) = ResumeKey::new(ctx.tenant_id(), &request.filter, next) else {
            return;
        };
        if let Some(resume) = self.resume_point(request, last).await {
            points.insert(key, resume);
        }
    }

    /// The native continuation that resumes right after `last`.
    ///
    /// Failures leave the next page without a resume point, which is then
    /// served by skipping.
    async fn resume_point(&self, request: &ScanRequest, last: &Record) -> Option<NativeContinuation> {
        let key = last_key::reconstruct(
            self.store,
            &request.filter.table_name,
            &request.primary_key,
            &request.resume_fields,
            last,
        )
        .await;
        match key {
            Ok(Some(key)) => match self.store.resume_after(&request.filter, key) {
                Ok(resume) => Some(resume),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not build continuation, next page will re-scan");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not recover resume key, next page will re-scan");
                None
            }
        }
    }
}

fn interrupt(items: Vec<Record>, error: DalError) -> DalResult<Scan> {
    let recoverable = error.is_transient() || matches!(error, DalError::Cancelled);
    if recoverable && !items.is_empty() {
        tracing::warn!(error = %error, accumulated = items.len(), "Stopping accumulation early");
        Ok(Scan {
            items,
            interrupted: true,
        })
    } else {
        Err(error)
    }
}
