//! Per-call tenant context.
//!
//! Every repository operation takes a [`TenantContext`]. The tenant id scopes
//! the query; the [`CancellationFlag`] lets the caller stop a multi-call
//! pagination or batch loop between backend calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::id::TenantId;

/// A shared, clonable cancellation signal.
///
/// Clones observe the same flag, so the caller keeps one handle and passes
/// the context (holding another) into the repository.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates a flag that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tenant identity and call-scoped signals for one repository operation.
///
/// ```
/// use helios_dal::tenant::{CancellationFlag, TenantContext, TenantId};
///
/// let flag = CancellationFlag::new();
/// let ctx = TenantContext::new(TenantId::new("acme"))
///     .with_correlation_id("req-42")
///     .with_cancellation(flag.clone());
///
/// assert!(!ctx.is_cancelled());
/// flag.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant_id: TenantId,
    correlation_id: Option<String>,
    cancellation: CancellationFlag,
}

impl TenantContext {
    /// Creates a context for the given tenant.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            correlation_id: None,
            cancellation: CancellationFlag::new(),
        }
    }

    /// Sets the correlation ID used in log events.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attaches a caller-owned cancellation flag.
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns the tenant ID.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the cancellation flag.
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    /// Returns `true` if the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
