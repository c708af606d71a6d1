//! Last-key reconstruction at logical page boundaries.
//!
//! A logical page usually ends in the middle of a backend page, where the
//! backend offers no continuation. The engine builds one from the last record
//! it returned: the table keys plus the keys of the queried index. When the
//! record in hand lacks some of them (a narrow projection), the full record is
//! re-read by primary key.

use crate::core::RecordStore;
use crate::error::DalResult;
use crate::types::{KeySchema, Record};

/// Copies `fields` out of `record`, or returns the names that are missing.
pub(crate) fn extract<'f>(record: &Record, fields: &'f [String]) -> Result<Record, Vec<&'f str>> {
    let mut key = Record::new();
    let mut missing = Vec::new();
    for field in fields {
        match record.get(field) {
            Some(value) => {
                key.insert(field.clone(), value.clone());
            }
            None => missing.push(field.as_str()),
        }
    }
    if missing.is_empty() { Ok(key) } else { Err(missing) }
}

/// Builds the resume key of `record`.
///
/// Returns `Ok(None)` when the key cannot be recovered at all: the record
/// lacks its primary key, or it no longer exists.
pub(crate) async fn reconstruct(
    store: &dyn RecordStore,
    table_name: &str,
    primary_key: &KeySchema,
    fields: &[String],
    record: &Record,
) -> DalResult<Option<Record>> {
    let missing = match extract(record, fields) {
        Ok(key) => return Ok(Some(key)),
        Err(missing) => missing,
    };

    let primary_fields: Vec<String> = primary_key.fields().into_iter().map(str::to_string).collect();
    let Ok(primary) = extract(record, &primary_fields) else {
        tracing::debug!(table = table_name, ?missing, "Resume key not recoverable without primary key");
        return Ok(None);
    };

    tracing::debug!(table = table_name, ?missing, "Re-reading record to complete resume key");
    let Some(full) = store.get(table_name, &primary).await? else {
        return Ok(None);
    };
    Ok(extract(&full, fields).ok())
}
