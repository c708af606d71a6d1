//! Record store implementations.
//!
//! Each backend implements [`RecordStore`](crate::core::RecordStore) for one
//! [`Dialect`](crate::compiler::Dialect) and is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | `memory` | In-process emulator for every dialect, for tests and local development |
//!
//! Production clients for the expression, document, selector and statement
//! stores live outside this crate and plug in through
//! [`StoreConnector`](crate::core::StoreConnector).
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "memory")]
//! # {
//! use helios_dal::backends::memory::MemoryStore;
//! use helios_dal::compiler::Dialect;
//! use helios_dal::types::{KeySchema, TableDescriptor};
//!
//! let store = MemoryStore::new(Dialect::Expression)
//!     .with_table(TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId"));
//! assert_eq!(store.record_count("orders"), 0);
//! # }
//! ```

#[cfg(feature = "memory")]
pub mod memory;
