//! The filter DSL: condition AST, parser and evaluator.
//!
//! Queries arrive as JSON, are parsed and fully validated into a [`Group`],
//! and are then handed to a [`FilterCompiler`](crate::compiler::FilterCompiler)
//! for a specific target dialect. The [`matches`] evaluator gives the same
//! answer in process.

mod ast;
mod evaluator;
mod parser;

pub use ast::{Condition, FieldCondition, Group, GroupKind, NestedSpec, Operand, Operator};
pub use evaluator::matches;
pub use parser::parse;
pub(crate) use parser::parse_field_conditions;
