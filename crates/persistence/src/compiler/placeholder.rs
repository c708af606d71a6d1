//! Alias bookkeeping for the expression dialect.
//!
//! Field names are rendered as `#nN` and literals as `:vN`. The two sigils
//! never collide with each other or with reserved words. Name aliases are
//! memoized per compilation; value aliases are always fresh.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::types::{FieldPath, PathSegment};

/// The accumulated output of an [`ExpressionBuilder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionParts {
    /// Key condition fragments joined with `AND`.
    pub key_condition: Option<String>,
    /// Filter fragments joined with `AND`.
    pub filter: Option<String>,
    /// Name alias to field name.
    pub names: BTreeMap<String, String>,
    /// Value alias to literal.
    pub values: BTreeMap<String, Value>,
}

/// Stateful per-compilation alias builder.
///
/// ```
/// use helios_dal::compiler::ExpressionBuilder;
/// use serde_json::json;
///
/// let mut builder = ExpressionBuilder::new();
/// let status = builder.add_name("status");
/// assert_eq!(status, "#n0");
/// assert_eq!(builder.add_name("status"), "#n0");
/// assert_eq!(builder.add_value(&json!("open")), ":v0");
/// assert_eq!(builder.add_value(&json!("open")), ":v1");
/// ```
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    name_aliases: HashMap<String, String>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
    key_conditions: Vec<String>,
    filters: Vec<String>,
}

impl ExpressionBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the alias of a field name, minting it on first use.
    pub fn add_name(&mut self, name: &str) -> String {
        if let Some(alias) = self.name_aliases.get(name) {
            return alias.clone();
        }
        let alias = format!("#n{}", self.name_aliases.len());
        self.name_aliases.insert(name.to_string(), alias.clone());
        self.names.insert(alias.clone(), name.to_string());
        alias
    }

    /// Renders a path with one name alias per member segment (`#n0.#n1[2]`).
    pub fn add_path(&mut self, path: &FieldPath) -> String {
        let mut rendered = String::new();
        for segment in path.segments() {
            match segment {
                PathSegment::Key(name) => {
                    if !rendered.is_empty() {
                        rendered.push('.');
                    }
                    rendered.push_str(&self.add_name(name));
                }
                PathSegment::Index(i) => rendered.push_str(&format!("[{}]", i)),
            }
        }
        rendered
    }

    /// Mints a fresh alias for a literal.
    pub fn add_value(&mut self, value: &Value) -> String {
        let alias = format!(":v{}", self.values.len());
        self.values.insert(alias.clone(), value.clone());
        alias
    }

    /// Appends a key condition fragment.
    pub fn add_key_condition(&mut self, fragment: impl Into<String>) {
        self.key_conditions.push(fragment.into());
    }

    /// Appends a filter fragment.
    pub fn add_filter(&mut self, fragment: impl Into<String>) {
        self.filters.push(fragment.into());
    }

    /// Consumes the builder and joins the accumulated fragments.
    pub fn result(self) -> ExpressionParts {
        ExpressionParts {
            key_condition: join_and(&self.key_conditions),
            filter: join_and(&self.filters),
            names: self.names,
            values: self.values,
        }
    }
}

fn join_and(fragments: &[String]) -> Option<String> {
    (!fragments.is_empty()).then(|| fragments.join(" AND "))
}
