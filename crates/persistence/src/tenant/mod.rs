//! Tenant scoping.
//!
//! Every read the data-access layer performs is scoped to one tenant: the
//! tenant value is folded into the key condition when an index is keyed on
//! the tenant field, and appended as an exact-match filter otherwise. Batch
//! reads drop any record whose tenant field differs from the caller's.
//!
//! - [`TenantId`] - opaque tenant identifier
//! - [`TenantContext`] - per-call tenant, correlation id and cancellation

mod context;
mod id;

pub use context::{CancellationFlag, TenantContext};
pub use id::TenantId;
