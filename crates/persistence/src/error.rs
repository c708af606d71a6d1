//! Error types for the data-access layer.
//!
//! Errors are grouped by the phase that produces them. Query validation and
//! compilation errors ([`ValidationError`], [`UnsupportedOperatorError`],
//! [`IndexError`]) are always raised before any backend call is made.
//! Execution errors ([`BackendError`]) come from the record store and drive
//! the retry and partial-result policies of the pagination and batch loops.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all data-access operations.
#[derive(Error, Debug)]
pub enum DalError {
    /// Malformed query or operand.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Operator used in a position that does not support it.
    #[error(transparent)]
    UnsupportedOperator(#[from] UnsupportedOperatorError),

    /// Secondary index lookup errors.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Errors reported by the backing record store.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The caller cancelled the operation before any result was accumulated.
    #[error("operation cancelled before any result was produced")]
    Cancelled,
}

impl DalError {
    /// Returns `true` if the error is a transient backend condition.
    pub fn is_transient(&self) -> bool {
        matches!(self, DalError::Backend(err) if err.is_transient())
    }

    /// Returns `true` if the error was raised while validating or compiling a query.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            DalError::Validation(_) | DalError::UnsupportedOperator(_) | DalError::Index(_)
        )
    }
}

/// Errors raised while parsing and validating a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// An operator key that the filter DSL does not know.
    #[error("unsupported query operator: {key}")]
    UnsupportedQueryOperator { key: String },

    /// The operand does not have the shape the operator requires.
    #[error("invalid operand for '{operator}' on field '{field}': {message}")]
    InvalidOperand {
        field: String,
        operator: String,
        message: String,
    },

    /// `$and` / `$or` with no members.
    #[error("{group} must be a non-empty array of field maps")]
    EmptyLogicalGroup { group: String },

    /// The query is not a field map, or a group member is not a field map.
    #[error("invalid query shape: {message}")]
    InvalidQueryShape { message: String },

    /// A field path that cannot be addressed.
    #[error("invalid field path: '{path}'")]
    InvalidFieldPath { path: String },

    /// The caller's partition value contradicts the tenant scope.
    #[error("partition value for index '{index_name}' conflicts with the tenant scope on '{tenant_field}'")]
    TenantScopeConflict {
        index_name: String,
        tenant_field: String,
    },

    /// An id could not be turned into a primary key.
    #[error("cannot build a primary key for table '{table}': {message}")]
    InvalidKey { table: String, message: String },

    /// The record rejected by the schema validator collaborator.
    #[error("record rejected by validator: {}", .messages.join("; "))]
    RecordRejected { messages: Vec<String> },

    /// Engine configuration or table descriptor that cannot be served.
    #[error("invalid configuration: {}", .messages.join("; "))]
    InvalidConfig { messages: Vec<String> },
}

/// Errors raised when an operator is valid in general but not in the position used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnsupportedOperatorError {
    /// Operator used inside `nestedMatch` / `nestedArrayMatch` that is not allowed there.
    #[error("nested query key not supported: {key}")]
    NestedKey { key: String },

    /// Operator bound to a key condition that key conditions cannot express.
    #[error("key condition on '{field}' does not support operator '{operator}'")]
    KeyCondition { field: String, operator: String },
}

/// Errors related to secondary index resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// The requested index was never declared on the table.
    #[error("secondary index not found: {index_name}")]
    NotFound { index_name: String },
}

/// Errors originating from the record store.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network, throughput or availability problems. Subject to partial-result policies.
    #[error("transient error in {backend_name}: {message}")]
    Transient {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend refused the requested evaluation limit.
    #[error("{backend_name} rejected evaluation limit {limit}")]
    EvaluationLimitExceeded { backend_name: String, limit: u32 },

    /// Non-retryable failure, e.g. a missing table or collection.
    #[error("fatal error in {backend_name}: {message}")]
    Fatal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A compiled filter was handed to a store speaking another dialect.
    #[error("{backend_name} cannot execute a {actual} filter (expects {expected})")]
    DialectMismatch {
        backend_name: String,
        expected: String,
        actual: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl BackendError {
    /// Creates a transient error without a source.
    pub fn transient(backend_name: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Transient {
            backend_name: backend_name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a fatal error without a source.
    pub fn fatal(backend_name: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Fatal {
            backend_name: backend_name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` if the retry/partial-result policies apply to this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Transient { .. } | BackendError::EvaluationLimitExceeded { .. }
        )
    }
}

/// Result type alias for data-access operations.
pub type DalResult<T> = Result<T, DalError>;

impl From<serde_json::Error> for DalError {
    fn from(err: serde_json::Error) -> Self {
        DalError::Backend(BackendError::Serialization {
            message: err.to_string(),
            source: Some(err),
        })
    }
}
