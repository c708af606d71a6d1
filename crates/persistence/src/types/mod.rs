//! Core types shared by every layer.
//!
//! - [`Record`] and the value helpers - the plain value model
//! - [`FieldPath`] - dotted / indexed addressing of nested fields
//! - [`TableDescriptor`], [`SecondaryIndexDescriptor`] - declared key layout
//! - [`PagingCursor`], [`NativeContinuation`], [`Page`] - pagination state
//!
//! # Examples
//!
//! ```
//! use helios_dal::types::{KeySchema, PagingCursor, SecondaryIndexDescriptor, TableDescriptor};
//!
//! let table = TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
//!     .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"));
//! assert!(table.index("byStatus").is_ok());
//!
//! let cursor = PagingCursor::new(2, 50);
//! assert_eq!(PagingCursor::decode(&cursor.encode()), Some(cursor));
//! ```

mod pagination;
mod path;
mod table;
pub mod value;

pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_NO, NativeContinuation, Page, PageInfo, PagingCursor};
pub use path::{FieldPath, PathSegment};
pub use table::{KeyDataType, KeySchema, SecondaryIndexDescriptor, TableDescriptor};
pub use value::{Record, ScalarKind};
