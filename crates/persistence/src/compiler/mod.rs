//! Filter compilers.
//!
//! A [`FilterCompiler`] turns a validated [`QueryPlan`] into the native query
//! representation of one [`Dialect`]. All compilers give operators the same
//! meaning; only the rendering differs:
//!
//! | Dialect | Native form | Limit counts | Continuation |
//! |---------|-------------|--------------|--------------|
//! | [`Dialect::Expression`] | key condition + filter expression with `#n`/`:v` aliases | evaluated items | last key |
//! | [`Dialect::Document`] | operator document (`$eq`, `$in`, ...) | returned items | token |
//! | [`Dialect::Selector`] | `SELECT ... FROM c WHERE ...` with `@p` parameters | returned items | token |
//! | [`Dialect::Statement`] | `SELECT ... FROM "t"."idx" WHERE ...` with `?` parameters | evaluated items | last key |
//!
//! ```
//! use helios_dal::compiler::{compiler_for, Dialect, KeyPart, QueryPlan};
//! use helios_dal::query::{parse, FieldCondition};
//!
//! let plan = QueryPlan::new("orders")
//!     .with_index("byStatus")
//!     .with_key(KeyPart::new(FieldCondition::eq("status", "open").unwrap()))
//!     .with_residual(parse(&serde_json::json!({"amount": {"gt": 100}})).unwrap());
//!
//! for dialect in Dialect::ALL {
//!     let compiled = compiler_for(dialect).compile(&plan, None).unwrap();
//!     assert_eq!(compiled.dialect(), dialect);
//! }
//! ```

mod document;
mod expression;
mod placeholder;
mod render;
mod selector;
mod statement;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DalResult, UnsupportedOperatorError};
use crate::query::{FieldCondition, Group};
use crate::types::FieldPath;

pub use document::{DocumentCompiler, DocumentQuery};
pub use expression::{ExpressionCompiler, ExpressionQuery};
pub use placeholder::{ExpressionBuilder, ExpressionParts};
pub use selector::{SelectorCompiler, SelectorParameter, SelectorQuery};
pub use statement::{StatementCompiler, StatementQuery};

/// The native query model of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Key-condition store with hashed expression placeholders.
    Expression,
    /// Document store with native operator objects.
    Document,
    /// Document store with SQL-like partitioned selectors.
    Selector,
    /// Statement store with parameterised pseudo-SQL.
    Statement,
}

impl Dialect {
    /// All dialects.
    pub const ALL: [Dialect; 4] = [
        Dialect::Expression,
        Dialect::Document,
        Dialect::Selector,
        Dialect::Statement,
    ];

    /// Returns the dialect name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Expression => "expression",
            Dialect::Document => "document",
            Dialect::Selector => "selector",
            Dialect::Statement => "statement",
        }
    }

    /// What a per-call limit counts on this dialect.
    pub fn limit_semantics(&self) -> LimitSemantics {
        match self {
            Dialect::Expression | Dialect::Statement => LimitSemantics::Evaluated,
            Dialect::Document | Dialect::Selector => LimitSemantics::Returned,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dialect '{}'", s))
    }
}

/// What a backend's per-call limit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSemantics {
    /// Items examined before the filter is applied.
    Evaluated,
    /// Items returned after the filter is applied.
    Returned,
}

/// Scan order over the index sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending sort key order.
    #[default]
    Ascending,
    /// Descending sort key order.
    Descending,
}

impl SortDirection {
    /// Returns `true` for ascending order.
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortDirection::Ascending)
    }
}

/// The key-bound part of an indexed query.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPart {
    /// Exact match on the index partition key.
    pub partition: FieldCondition,
    /// Optional condition on the index sort key.
    pub sort: Option<FieldCondition>,
}

impl KeyPart {
    /// Creates a key part with a partition condition only.
    pub fn new(partition: FieldCondition) -> Self {
        Self {
            partition,
            sort: None,
        }
    }

    /// Adds a sort key condition.
    pub fn with_sort(mut self, sort: FieldCondition) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Returns the key conditions, partition first.
    pub fn conditions(&self) -> impl Iterator<Item = &FieldCondition> {
        std::iter::once(&self.partition).chain(self.sort.as_ref())
    }

    /// Checks that every key condition uses an operator a key condition can express.
    pub fn validate(&self) -> DalResult<()> {
        for condition in self.conditions() {
            if !condition.operator().allowed_in_key_condition() {
                return Err(UnsupportedOperatorError::KeyCondition {
                    field: condition.field().to_string(),
                    operator: condition.operator().as_str().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Everything a compiler needs to render one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Table, collection or container name.
    pub table_name: String,
    /// Secondary index to query, if any.
    pub index_name: Option<String>,
    /// Key-bound conditions.
    pub key: Option<KeyPart>,
    /// Residual filter.
    pub residual: Group,
    /// Scan order.
    pub direction: SortDirection,
    /// Sort key field used to order results.
    pub sort_field: Option<String>,
}

impl QueryPlan {
    /// Creates a plan with no conditions.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: None,
            key: None,
            residual: Group::empty(),
            direction: SortDirection::Ascending,
            sort_field: None,
        }
    }

    /// Targets a secondary index.
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Sets the key part.
    pub fn with_key(mut self, key: KeyPart) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets the residual filter.
    pub fn with_residual(mut self, residual: Group) -> Self {
        self.residual = residual;
        self
    }

    /// Checks the key operators and the residual's group structure.
    pub fn validate(&self) -> DalResult<()> {
        if let Some(key) = &self.key {
            key.validate()?;
        }
        self.residual.validate()?;
        Ok(())
    }

    /// Sets the scan direction and the field it orders by.
    pub fn with_order(mut self, sort_field: Option<String>, direction: SortDirection) -> Self {
        self.sort_field = sort_field;
        self.direction = direction;
        self
    }
}

/// Native query payload of one dialect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NativeFilter {
    /// Expression dialect.
    Expression(ExpressionQuery),
    /// Document dialect.
    Document(DocumentQuery),
    /// Selector dialect.
    Selector(SelectorQuery),
    /// Statement dialect.
    Statement(StatementQuery),
}

impl NativeFilter {
    /// Returns the dialect of the payload.
    pub fn dialect(&self) -> Dialect {
        match self {
            NativeFilter::Expression(_) => Dialect::Expression,
            NativeFilter::Document(_) => Dialect::Document,
            NativeFilter::Selector(_) => Dialect::Selector,
            NativeFilter::Statement(_) => Dialect::Statement,
        }
    }
}

/// A compiled query: the native payload plus the target it runs against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFilter {
    /// Table, collection or container name.
    pub table_name: String,
    /// Secondary index, if any.
    pub index_name: Option<String>,
    /// Scan order.
    pub direction: SortDirection,
    /// The native query.
    pub native: NativeFilter,
}

impl CompiledFilter {
    fn from_plan(plan: &QueryPlan, native: NativeFilter) -> Self {
        Self {
            table_name: plan.table_name.clone(),
            index_name: plan.index_name.clone(),
            direction: plan.direction,
            native,
        }
    }

    /// Returns the dialect of the native payload.
    pub fn dialect(&self) -> Dialect {
        self.native.dialect()
    }
}

/// Renders validated plans into one native dialect.
pub trait FilterCompiler: Send + Sync {
    /// The dialect this compiler renders.
    fn dialect(&self) -> Dialect;

    /// Compiles a plan, optionally restricting returned fields.
    fn compile(&self, plan: &QueryPlan, projection: Option<&[FieldPath]>) -> DalResult<CompiledFilter>;

    /// Compiles a bare condition group as the filter of a full-table scan.
    fn compile_group(
        &self,
        table_name: &str,
        group: &Group,
        projection: Option<&[FieldPath]>,
    ) -> DalResult<CompiledFilter> {
        self.compile(&QueryPlan::new(table_name).with_residual(group.clone()), projection)
    }
}

/// Returns the compiler for a dialect.
pub fn compiler_for(dialect: Dialect) -> Box<dyn FilterCompiler> {
    match dialect {
        Dialect::Expression => Box::new(ExpressionCompiler::new()),
        Dialect::Document => Box::new(DocumentCompiler::new()),
        Dialect::Selector => Box::new(SelectorCompiler::new()),
        Dialect::Statement => Box::new(StatementCompiler::new()),
    }
}
