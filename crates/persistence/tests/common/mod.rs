//! Test infrastructure for the data-access layer.
//!
//! This module provides reusable fixtures and a harness for running the same
//! scenario against every dialect of the in-memory store.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
