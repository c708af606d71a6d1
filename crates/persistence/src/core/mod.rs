//! Backend boundary.
//!
//! - [`RecordStore`] - key-addressed reads/writes and compiled query execution
//! - [`StoreConnector`] - creates backend clients
//! - [`SharedStore`] - lazily connected, shared handle
//!
//! A backend implements [`RecordStore`] for exactly one [`Dialect`](crate::compiler::Dialect)
//! and rejects filters compiled for any other.

mod handle;
mod store;

pub use handle::{SharedStore, StoreConnector};
pub use store::{MultiGetOutput, QueryOutput, RecordStore, StoreQuery};
