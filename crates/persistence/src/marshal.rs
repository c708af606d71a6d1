//! Conversion between plain values and typed wire attributes.
//!
//! The expression and statement dialects bind literal values as typed
//! attributes (`{"S": "open"}`, `{"N": "250"}`) rather than plain JSON. The
//! [`Marshaller`] trait is the boundary; [`AttributeMarshaller`] is the
//! default implementation used by the compilers and the in-memory store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{BackendError, DalResult};
use crate::types::Record;

/// A typed wire attribute.
///
/// Serializes in the externally tagged form used on the wire:
///
/// ```
/// use helios_dal::marshal::AttributeValue;
///
/// let attr = AttributeValue::N("250".to_string());
/// assert_eq!(serde_json::to_string(&attr).unwrap(), r#"{"N":"250"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, carried as its decimal text.
    N(String),
    /// Boolean.
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Null.
    #[serde(rename = "NULL")]
    Null(bool),
    /// List.
    L(Vec<AttributeValue>),
    /// Map.
    M(BTreeMap<String, AttributeValue>),
}

/// Translates between the plain value model and a backend's attribute encoding.
pub trait Marshaller: Send + Sync {
    /// Encodes a plain value.
    fn marshal(&self, value: &Value) -> AttributeValue;

    /// Decodes a wire attribute.
    fn unmarshal(&self, attribute: &AttributeValue) -> DalResult<Value>;

    /// Encodes every member of a record.
    fn marshal_record(&self, record: &Record) -> BTreeMap<String, AttributeValue> {
        record
            .iter()
            .map(|(k, v)| (k.clone(), self.marshal(v)))
            .collect()
    }

    /// Decodes a map of attributes into a record.
    fn unmarshal_record(&self, attributes: &BTreeMap<String, AttributeValue>) -> DalResult<Record> {
        attributes
            .iter()
            .map(|(k, v)| -> DalResult<(String, Value)> { Ok((k.clone(), self.unmarshal(v)?)) })
            .collect()
    }
}

/// The default [`Marshaller`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMarshaller;

impl Marshaller for AttributeMarshaller {
    fn marshal(&self, value: &Value) -> AttributeValue {
        match value {
            Value::Null => AttributeValue::Null(true),
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => AttributeValue::N(n.to_string()),
            Value::String(s) => AttributeValue::S(s.clone()),
            Value::Array(items) => AttributeValue::L(items.iter().map(|v| self.marshal(v)).collect()),
            Value::Object(map) => AttributeValue::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.marshal(v)))
                    .collect(),
            ),
        }
    }

    fn unmarshal(&self, attribute: &AttributeValue) -> DalResult<Value> {
        let value = match attribute {
            AttributeValue::S(s) => Value::String(s.clone()),
            AttributeValue::N(text) => Value::Number(parse_number(text)?),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Null(_) => Value::Null,
            AttributeValue::L(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.unmarshal(item))
                    .collect::<DalResult<Vec<_>>>()?,
            ),
            AttributeValue::M(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| -> DalResult<(String, Value)> {
                        Ok((k.clone(), self.unmarshal(v)?))
                    })
                    .collect::<DalResult<Map<String, Value>>>()?,
            ),
        };
        Ok(value)
    }
}

fn parse_number(text: &str) -> DalResult<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Ok(Number::from(u));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| {
            BackendError::Serialization {
                message: format!("invalid number attribute '{}'", text),
                source: None,
            }
            .into()
        })
}
