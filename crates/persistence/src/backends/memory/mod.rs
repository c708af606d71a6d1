//! In-process store emulator.
//!
//! [`MemoryStore`] executes the compiled output of every dialect against
//! records held in memory. It is meant for tests and local development:
//! the same filter DSL can be run end to end on all four targets without
//! external services.
//!
//! # Example
//!
//! ```
//! use helios_dal::backends::memory::MemoryStore;
//! use helios_dal::compiler::Dialect;
//! use helios_dal::core::RecordStore;
//!
//! let store = MemoryStore::new(Dialect::Selector);
//! assert_eq!(store.backend_name(), "memory");
//! ```

mod document;
mod infix;
mod store;

pub use store::{MemoryStats, MemoryStore};
