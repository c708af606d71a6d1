//! Tenant identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque tenant identifier.
///
/// The value is compared verbatim against the table's tenant field, so it is
/// stored and matched exactly as given (no case folding, no trimming).
///
/// # Examples
///
/// ```
/// use helios_dal::tenant::TenantId;
///
/// let tenant = TenantId::new("acme");
/// assert_eq!(tenant.as_str(), "acme");
/// assert_eq!(tenant.to_value(), serde_json::json!("acme"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tenant ID as a record value.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// Returns `true` if a record value holds this tenant.
    pub fn matches(&self, value: &Value) -> bool {
        value.as_str() == Some(self.0.as_str())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
