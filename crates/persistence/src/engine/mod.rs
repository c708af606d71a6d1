//! Execution loops.
//!
//! - [`Paginator`] - accumulates backend pages into logical pages
//! - [`BatchFetcher`] - chunked multi-get with unprocessed-key retries
//! - [`ResumePoints`] - server-side native resume points of handed-out cursors
//!
//! Both issue backend calls strictly one after another and check the
//! caller's cancellation flag before each call.

mod batch;
mod last_key;
mod paginator;
mod resume;

pub use batch::BatchFetcher;
pub use paginator::{Paginator, ScanRequest};
pub use resume::{ResumeKey, ResumePoints, ResumeStats};
