//! Condition AST.
//!
//! A query is a [`Group`] of [`Condition`]s. Leaves are [`FieldCondition`]s,
//! which can only be built through [`FieldCondition::new`], so every condition
//! that reaches a compiler has an operand of the right shape.

use std::fmt;

use serde_json::Value;

use crate::error::{DalError, UnsupportedOperatorError, ValidationError};
use crate::types::value::{ScalarKind, compare_values, scalar_kind};
use crate::types::FieldPath;

/// Query operators of the filter DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal (true when the field is missing).
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Inclusive range.
    Between,
    /// Case-sensitive string prefix.
    BeginsWith,
    /// Substring test.
    Contains,
    /// Negated substring test (true when the field is missing).
    NotContains,
    /// Set membership.
    In,
    /// Set exclusion (true when the field is missing).
    Nin,
    /// Field presence or absence.
    Exists,
    /// At least one array element equals one of the candidates.
    ElemMatch,
    /// Conditions on sub-fields of an object.
    NestedMatch,
    /// Conditions on sub-fields of one array element.
    NestedArrayMatch,
}

impl Operator {
    /// All operators, in DSL order.
    pub const ALL: [Operator; 16] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::Between,
        Operator::BeginsWith,
        Operator::Contains,
        Operator::NotContains,
        Operator::In,
        Operator::Nin,
        Operator::Exists,
        Operator::ElemMatch,
        Operator::NestedMatch,
        Operator::NestedArrayMatch,
    ];

    /// Parses a DSL operator key.
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == key)
    }

    /// Returns the DSL key of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Between => "between",
            Operator::BeginsWith => "beginsWith",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Exists => "exists",
            Operator::ElemMatch => "elemMatch",
            Operator::NestedMatch => "nestedMatch",
            Operator::NestedArrayMatch => "nestedArrayMatch",
        }
    }

    /// Returns `true` if the operator may appear inside `nestedMatch` / `nestedArrayMatch`.
    pub fn allowed_nested(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Ne
                | Operator::Lt
                | Operator::Lte
                | Operator::Gt
                | Operator::Gte
                | Operator::Between
                | Operator::BeginsWith
                | Operator::Contains
                | Operator::Exists
                | Operator::In
                | Operator::Nin
        )
    }

    /// Returns `true` if the operator can bind to a sort key in a key condition.
    pub fn allowed_in_key_condition(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::Lt
                | Operator::Lte
                | Operator::Gt
                | Operator::Gte
                | Operator::Between
                | Operator::BeginsWith
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-conditions of `nestedMatch` / `nestedArrayMatch`.
///
/// Condition paths are relative to the parent field (and array element, if `index` is set).
#[derive(Debug, Clone, PartialEq)]
pub struct NestedSpec {
    /// Array element addressed by `nestedArrayMatch`.
    pub index: Option<u32>,
    /// Conditions on sub-fields, implicitly AND-ed.
    pub conditions: Vec<FieldCondition>,
}

/// The operand of a field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single literal.
    Value(Value),
    /// Inclusive range bounds.
    Range {
        /// Lower bound.
        low: Value,
        /// Upper bound.
        high: Value,
    },
    /// Candidate set for `in`, `nin` and `elemMatch`.
    List(Vec<Value>),
    /// Presence flag for `exists`.
    Flag(bool),
    /// Sub-field conditions.
    Nested(NestedSpec),
}

/// A validated condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    field: FieldPath,
    operator: Operator,
    operand: Operand,
}

impl FieldCondition {
    /// Creates a condition, validating the operand against the operator.
    pub fn new(field: FieldPath, operator: Operator, operand: Operand) -> Result<Self, DalError> {
        validate_operand(&field, operator, &operand)?;
        Ok(Self {
            field,
            operator,
            operand,
        })
    }

    /// Shorthand for an exact-match condition on a dotted field.
    pub fn eq(field: &str, value: impl Into<Value>) -> Result<Self, DalError> {
        Self::new(
            FieldPath::parse(field)?,
            Operator::Eq,
            Operand::Value(value.into()),
        )
    }

    /// Returns the field path.
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    /// Returns the operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns the operand.
    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// How a group combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// All members must match.
    And,
    /// At least one member must match.
    Or,
}

impl GroupKind {
    /// The DSL key of the group (`$and` / `$or`).
    pub fn key(&self) -> &'static str {
        match self {
            GroupKind::And => "$and",
            GroupKind::Or => "$or",
        }
    }
}

/// A member of a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A single field condition.
    Field(FieldCondition),
    /// A nested group.
    Group(Group),
}

/// A conjunction or disjunction of conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// How members combine.
    pub kind: GroupKind,
    /// The members.
    pub members: Vec<Condition>,
}

impl Group {
    /// Creates an AND group.
    pub fn and(members: Vec<Condition>) -> Self {
        Self {
            kind: GroupKind::And,
            members,
        }
    }

    /// Creates an OR group.
    pub fn or(members: Vec<Condition>) -> Self {
        Self {
            kind: GroupKind::Or,
            members,
        }
    }

    /// An empty AND group (matches everything).
    pub fn empty() -> Self {
        Self::and(Vec::new())
    }

    /// Builds an AND group of field conditions.
    pub fn all(conditions: impl IntoIterator<Item = FieldCondition>) -> Self {
        Self::and(conditions.into_iter().map(Condition::Field).collect())
    }

    /// Returns `true` if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns a new AND group holding this group's constraints and `condition`.
    ///
    /// An AND group is extended in place of a copy; an OR group is wrapped.
    pub fn and_with(&self, condition: Condition) -> Group {
        match self.kind {
            GroupKind::And => {
                let mut members = self.members.clone();
                members.push(condition);
                Group::and(members)
            }
            GroupKind::Or if self.is_empty() => Group::and(vec![condition]),
            GroupKind::Or => Group::and(vec![Condition::Group(self.clone()), condition]),
        }
    }

    /// Checks that no nested group is empty and that this group is not an
    /// empty OR.
    ///
    /// The parser never builds such groups. An empty member has no native
    /// spelling, so hand-built ones are rejected before rendering.
    pub fn validate(&self) -> Result<(), DalError> {
        if self.kind == GroupKind::Or && self.is_empty() {
            return Err(empty_group(self.kind));
        }
        for member in &self.members {
            if let Condition::Group(inner) = member {
                if inner.is_empty() {
                    return Err(empty_group(inner.kind));
                }
                inner.validate()?;
            }
        }
        Ok(())
    }

    /// Returns the top-level field conditions of an AND group.
    pub fn top_level_fields(&self) -> impl Iterator<Item = &FieldCondition> {
        self.members.iter().filter_map(|member| match member {
            Condition::Field(field) if self.kind == GroupKind::And => Some(field),
            _ => None,
        })
    }
}

fn empty_group(kind: GroupKind) -> DalError {
    ValidationError::EmptyLogicalGroup {
        group: kind.key().to_string(),
    }
    .into()
}

fn invalid(field: &FieldPath, operator: Operator, message: impl Into<String>) -> DalError {
    ValidationError::InvalidOperand {
        field: field.to_string(),
        operator: operator.as_str().to_string(),
        message: message.into(),
    }
    .into()
}

fn homogeneous_list(field: &FieldPath, operator: Operator, values: &[Value]) -> Result<(), DalError> {
    let Some(first) = values.first() else {
        return Err(invalid(field, operator, "candidate list must not be empty"));
    };
    let kind = match scalar_kind(first) {
        Some(ScalarKind::Null) | None => {
            return Err(invalid(field, operator, "candidates must be strings, numbers or booleans"));
        }
        Some(kind) => kind,
    };
    if values.iter().any(|v| scalar_kind(v) != Some(kind)) {
        return Err(invalid(field, operator, "candidates must all have the same type"));
    }
    Ok(())
}

fn validate_operand(field: &FieldPath, operator: Operator, operand: &Operand) -> Result<(), DalError> {
    match (operator, operand) {
        (Operator::Eq | Operator::Ne, Operand::Value(value)) => {
            if scalar_kind(value).is_none() {
                return Err(invalid(field, operator, "operand must be a scalar"));
            }
        }
        (Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte, Operand::Value(value)) => {
            if !matches!(value, Value::String(_) | Value::Number(_)) {
                return Err(invalid(field, operator, "operand must be a string or number"));
            }
        }
        (Operator::Between, Operand::Range { low, high }) => {
            let low_kind = scalar_kind(low);
            if !matches!(low_kind, Some(ScalarKind::String | ScalarKind::Number))
                || low_kind != scalar_kind(high)
            {
                return Err(invalid(
                    field,
                    operator,
                    "bounds must be two strings or two numbers",
                ));
            }
            if compare_values(low, high) == Some(std::cmp::Ordering::Greater) {
                return Err(invalid(field, operator, "lower bound exceeds upper bound"));
            }
        }
        (Operator::BeginsWith | Operator::Contains | Operator::NotContains, Operand::Value(value)) => {
            match value {
                Value::String(s) if !s.is_empty() => {}
                _ => return Err(invalid(field, operator, "operand must be a non-empty string")),
            }
        }
        (Operator::In | Operator::Nin | Operator::ElemMatch, Operand::List(values)) => {
            homogeneous_list(field, operator, values)?;
        }
        (Operator::Exists, Operand::Flag(_)) => {}
        (Operator::NestedMatch, Operand::Nested(nested)) => {
            if nested.index.is_some() {
                return Err(invalid(field, operator, "nestedMatch does not take an index"));
            }
            validate_nested(field, operator, nested)?;
        }
        (Operator::NestedArrayMatch, Operand::Nested(nested)) => {
            if nested.index.is_none() {
                return Err(invalid(field, operator, "nestedArrayMatch requires an index"));
            }
            validate_nested(field, operator, nested)?;
        }
        _ => return Err(invalid(field, operator, "operand has the wrong shape")),
    }
    Ok(())
}

fn validate_nested(field: &FieldPath, operator: Operator, nested: &NestedSpec) -> Result<(), DalError> {
    if nested.conditions.is_empty() {
        return Err(invalid(field, operator, "at least one sub-field condition is required"));
    }
    if let Some(bad) = nested
        .conditions
        .iter()
        .find(|condition| !condition.operator.allowed_nested())
    {
        return Err(UnsupportedOperatorError::NestedKey {
            key: bad.operator.as_str().to_string(),
        }
        .into());
    }
    Ok(())
}
