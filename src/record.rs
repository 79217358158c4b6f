use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::StoreError;
use crate::schema::{ColumnKind, Schema};

/// Raw field strings in schema column order, exactly as collected from a
/// form, CLI flags, or a CSV row. Nothing is validated until `normalize`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFields(Vec<String>);

impl RawFields {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[String] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for RawFields {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// One normalized row, values in schema column order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    values: Vec<String>,
}

impl Record {
    pub(crate) fn from_values(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[String] {
        self.values.as_slice()
    }

    /// Field lookup by column name through the schema the record was built for.
    pub fn get<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a str> {
        schema
            .position(name)
            .and_then(|position| self.values.get(position))
            .map(String::as_str)
    }
}

/// Validate and canonicalize one raw row into a storable record.
///
/// Text and date columns pass through unchanged. A code column is either
/// empty (whitespace collapses to the empty string, no validation) or valid
/// JSON re-serialized with 4-space indentation, keys in parsed order. On
/// `InvalidCode` the caller's other field input stays untouched in the raw
/// row, so a rejected entry is never silently dropped.
pub fn normalize(schema: &Schema, raw: &RawFields) -> Result<Record, StoreError> {
    if raw.len() != schema.len() {
        return Err(StoreError::FieldCount {
            expected: schema.len(),
            found: raw.len(),
        });
    }
    let mut values = Vec::with_capacity(schema.len());
    for (column, value) in schema.columns().iter().zip(raw.values()) {
        match column.kind {
            ColumnKind::Json => values.push(canonical_json(value.as_str())?),
            ColumnKind::Date | ColumnKind::Text => values.push(value.clone()),
        }
    }
    Ok(Record { values })
}

/// Deterministic re-serialization of a JSON blob: 4-space indent, key order
/// as parsed. Empty or all-whitespace input canonicalizes to the empty string.
pub fn canonical_json(raw: &str) -> Result<String, StoreError> {
    if raw.trim().is_empty() {
        return Ok(String::new());
    }
    let parsed: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| StoreError::InvalidCode {
            code: raw.to_string(),
            detail: err.to_string(),
        })?;
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    parsed
        .serialize(&mut serializer)
        .map_err(|err| StoreError::Io {
            detail: err.to_string(),
        })?;
    String::from_utf8(out).map_err(|err| StoreError::Io {
        detail: err.to_string(),
    })
}
