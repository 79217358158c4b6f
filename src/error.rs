use std::error::Error;
use std::fmt;

/// Every failure the store can surface. Nothing here is fatal: the in-memory
/// sequence is left in a consistent state and control returns to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Non-JSON text in a code column; carries the original unparsed input so
    /// the caller can re-present it instead of discarding the user's entry.
    InvalidCode { code: String, detail: String },
    /// Raw row width does not match the schema.
    FieldCount { expected: usize, found: usize },
    /// Stale or invalid row position. Never clamped, never ignored.
    IndexOutOfRange { index: usize, len: usize },
    /// CSV header row does not name the schema's columns.
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// Bulk import stopped at the given 0-based row.
    ImportFailed { row: usize, cause: Box<StoreError> },
    /// Backend read/write/decrypt failure with the underlying cause.
    Io { detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidCode { detail, .. } => {
                write!(f, "invalid JSON in the Code field: {detail}")
            }
            StoreError::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            StoreError::IndexOutOfRange { index, len } => {
                write!(f, "record index {index} is out of range (table has {len} rows)")
            }
            StoreError::HeaderMismatch { expected, found } => {
                write!(
                    f,
                    "header row [{}] does not match the schema columns [{}]",
                    found.join(", "),
                    expected.join(", ")
                )
            }
            StoreError::ImportFailed { row, cause } => {
                write!(f, "import failed at row {row}: {cause}")
            }
            StoreError::Io { detail } => write!(f, "storage failure: {detail}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::ImportFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
