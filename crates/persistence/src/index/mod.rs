//! Secondary index resolution.
//!
//! Splits a caller's indexed query into the key-bound part and the residual
//! filter, and applies the tenant scope. See [`IndexResolver`].

mod resolver;

pub use resolver::{IndexResolver, ResolvedQuery};
