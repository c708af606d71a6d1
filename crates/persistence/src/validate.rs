//! Record validation boundary.
//!
//! [`Repository::save`](crate::repository::Repository::save) runs the
//! configured [`RecordValidator`] before writing. Validators may normalise the
//! record they accept.

use serde_json::Value;

use crate::types::Record;

/// Validates records before they are written.
pub trait RecordValidator: Send + Sync {
    /// Returns the (possibly normalised) record, or every problem found.
    fn validate(&self, record: Record) -> Result<Record, Vec<String>>;
}

/// Accepts every record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RecordValidator for AcceptAll {
    fn validate(&self, record: Record) -> Result<Record, Vec<String>> {
        Ok(record)
    }
}

/// Requires a set of top-level fields to be present and non-null.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    /// Creates a validator requiring `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RecordValidator for RequiredFields {
    fn validate(&self, record: Record) -> Result<Record, Vec<String>> {
        let errors: Vec<String> = self
            .fields
            .iter()
            .filter(|field| matches!(record.get(field.as_str()), None | Some(Value::Null)))
            .map(|field| format!("missing required field '{}'", field))
            .collect();
        if errors.is_empty() { Ok(record) } else { Err(errors) }
    }
}
