//! Table and secondary index descriptors.
//!
//! A [`TableDescriptor`] is declared once when a repository is built and is
//! immutable afterwards. Every indexed query looks its index up by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Data type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyDataType {
    /// String key.
    #[default]
    String,
    /// Numeric key.
    Number,
    /// Binary key.
    Binary,
}

/// The primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySchema {
    /// Partition (hash) key field.
    pub partition_key: String,
    /// Optional sort (range) key field.
    #[serde(default)]
    pub sort_key: Option<String>,
}

impl KeySchema {
    /// Creates a partition-only key schema.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Creates a composite key schema.
    pub fn composite(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    /// Returns the key fields, partition key first.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = vec![self.partition_key.as_str()];
        if let Some(sort) = &self.sort_key {
            fields.push(sort.as_str());
        }
        fields
    }
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryIndexDescriptor {
    /// Name callers use to select the index.
    pub index_name: String,
    /// Partition key field of the index.
    pub partition_key_field: String,
    /// Optional sort key field of the index.
    #[serde(default)]
    pub sort_key_field: Option<String>,
    /// Declared data types of the key fields.
    #[serde(default)]
    pub data_types: BTreeMap<String, KeyDataType>,
}

impl SecondaryIndexDescriptor {
    /// Creates an index with a partition key only.
    pub fn new(index_name: impl Into<String>, partition_key_field: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            partition_key_field: partition_key_field.into(),
            sort_key_field: None,
            data_types: BTreeMap::new(),
        }
    }

    /// Sets the sort key field.
    pub fn with_sort_key(mut self, sort_key_field: impl Into<String>) -> Self {
        self.sort_key_field = Some(sort_key_field.into());
        self
    }

    /// Declares the data type of a key field.
    pub fn with_data_type(mut self, field: impl Into<String>, data_type: KeyDataType) -> Self {
        self.data_types.insert(field.into(), data_type);
        self
    }

    /// Returns the index key fields, partition key first.
    pub fn key_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.partition_key_field.as_str()];
        if let Some(sort) = &self.sort_key_field {
            fields.push(sort.as_str());
        }
        fields
    }

    /// Returns `true` if `field` is the partition or sort key of this index.
    pub fn is_key_field(&self, field: &str) -> bool {
        self.partition_key_field == field || self.sort_key_field.as_deref() == Some(field)
    }
}

/// Describes a table: its primary key, tenant field and secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    /// Physical table / collection / container name.
    pub table_name: String,
    /// Primary key of the table.
    pub primary_key: KeySchema,
    /// Field that scopes every record to a tenant.
    pub tenant_field: String,
    /// Declared secondary indexes.
    #[serde(default)]
    pub indexes: Vec<SecondaryIndexDescriptor>,
}

impl TableDescriptor {
    /// Creates a table descriptor with no secondary indexes.
    pub fn new(
        table_name: impl Into<String>,
        primary_key: KeySchema,
        tenant_field: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key,
            tenant_field: tenant_field.into(),
            indexes: Vec::new(),
        }
    }

    /// Declares a secondary index.
    pub fn with_index(mut self, index: SecondaryIndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up a secondary index by name.
    pub fn index(&self, index_name: &str) -> Result<&SecondaryIndexDescriptor, IndexError> {
        self.indexes
            .iter()
            .find(|index| index.index_name == index_name)
            .ok_or_else(|| IndexError::NotFound {
                index_name: index_name.to_string(),
            })
    }

    /// Returns the fields a resume key needs for `index`: table keys, then index keys.
    pub fn resume_key_fields(&self, index: &SecondaryIndexDescriptor) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for field in self.primary_key.fields().into_iter().chain(index.key_fields()) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }

    /// Checks the descriptor for declaration mistakes.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.table_name.is_empty() {
            errors.push("table name must not be empty".to_string());
        }
        if self.primary_key.partition_key.is_empty() {
            errors.push("primary partition key must not be empty".to_string());
        }
        if self.tenant_field.is_empty() {
            errors.push("tenant field must not be empty".to_string());
        }
        for (i, index) in self.indexes.iter().enumerate() {
            if index.index_name.is_empty() || index.partition_key_field.is_empty() {
                errors.push(format!("index #{} must name itself and its partition key", i));
            }
            if self.indexes[..i]
                .iter()
                .any(|other| other.index_name == index.index_name)
            {
                errors.push(format!("duplicate index name '{}'", index.index_name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_table() -> TableDescriptor {
        TableDescriptor::new("orders", KeySchema::partition("id"), "tenantId")
            .with_index(SecondaryIndexDescriptor::new("byStatus", "status").with_sort_key("createdAt"))
            .with_index(SecondaryIndexDescriptor::new("byTenant", "tenantId").with_sort_key("createdAt"))
    }

    #[test]
    fn test_index_lookup() {
        let table = orders_table();
        assert_eq!(table.index("byStatus").unwrap().partition_key_field, "status");
        assert_eq!(
            table.index("missing").unwrap_err(),
            IndexError::NotFound {
                index_name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_resume_key_fields_deduplicates() {
        let table = TableDescriptor::new("t", KeySchema::composite("tenantId", "id"), "tenantId")
            .with_index(SecondaryIndexDescriptor::new("byTenant", "tenantId").with_sort_key("createdAt"));
        let index = table.index("byTenant").unwrap();
        assert_eq!(
            table.resume_key_fields(index),
            vec!["tenantId".to_string(), "id".to_string(), "createdAt".to_string()]
        );
    }

    #[test]
    fn test_validate_duplicate_index() {
        let table = orders_table().with_index(SecondaryIndexDescriptor::new("byStatus", "x"));
        let errors = table.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("duplicate index name")));
    }

    #[test]
    fn test_deserialize_from_json() {
        let table: TableDescriptor = serde_json::from_str(
            r#"{
                "tableName": "orders",
                "primaryKey": {"partitionKey": "id"},
                "tenantField": "tenantId",
                "indexes": [
                    {"indexName": "byStatus", "partitionKeyField": "status",
                     "sortKeyField": "amount", "dataTypes": {"amount": "number"}}
                ]
            }"#,
        )
        .unwrap();
        let index = table.index("byStatus").unwrap();
        assert_eq!(index.data_types.get("amount"), Some(&KeyDataType::Number));
        assert!(table.validate().is_ok());
    }
}
