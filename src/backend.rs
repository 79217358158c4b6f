use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::crypto::{
    decode_b64, decrypt_envelope_with_key, derive_key, encrypt_text_with_key, fresh_salt,
    CryptoEnvelope, PBKDF2_ITERATIONS,
};
use crate::csv;
use crate::error::StoreError;
use crate::record::Record;
use crate::schema::{ColumnKind, Schema};

/// Persistence behind the store. `write` always receives the entire current
/// sequence: the table is cleared and rewritten on every mutation, never
/// patched. `log_added` is the optional append-only trail of added records;
/// backends without one inherit the no-op.
pub trait Backend {
    fn read(&mut self, schema: &Schema) -> Result<Vec<Record>, StoreError>;
    fn write(&mut self, schema: &Schema, records: &[Record]) -> Result<(), StoreError>;
    fn log_added(&mut self, schema: &Schema, record: &Record) -> Result<(), StoreError> {
        let _ = (schema, record);
        Ok(())
    }
}

/// In-process backend; doubles as the write-failure test rig.
#[derive(Default)]
pub struct MemoryBackend {
    rows: Vec<Record>,
    fail_next_write: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the backend so the next `write` is rejected, leaving stored rows
    /// untouched. Used to exercise the store's rollback path.
    pub fn fail_next_write(&mut self) {
        self.fail_next_write = true;
    }
}

impl Backend for MemoryBackend {
    fn read(&mut self, _schema: &Schema) -> Result<Vec<Record>, StoreError> {
        Ok(self.rows.clone())
    }

    fn write(&mut self, _schema: &Schema, records: &[Record]) -> Result<(), StoreError> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(StoreError::Io {
                detail: "memory backend rejected the write".to_string(),
            });
        }
        self.rows = records.to_vec();
        Ok(())
    }
}

/// Rows file (pretty-printed JSON array of objects keyed by column name) plus
/// an optional append-only log: one single-line JSON object per added record.
pub struct FileBackend {
    rows_path: PathBuf,
    log_path: Option<PathBuf>,
}

impl FileBackend {
    pub fn new(rows_path: PathBuf) -> Self {
        Self {
            rows_path,
            log_path: None,
        }
    }

    pub fn with_log(rows_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            rows_path,
            log_path: Some(log_path),
        }
    }
}

impl Backend for FileBackend {
    fn read(&mut self, schema: &Schema) -> Result<Vec<Record>, StoreError> {
        if !self.rows_path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(self.rows_path.as_path()).map_err(io_error)?;
        let value: serde_json::Value = serde_json::from_str(raw.as_str()).map_err(io_error)?;
        rows_from_value(schema, &value)
    }

    fn write(&mut self, schema: &Schema, records: &[Record]) -> Result<(), StoreError> {
        let value = rows_to_value(schema, records);
        let content = serde_json::to_string_pretty(&value).map_err(io_error)?;
        write_text_file(self.rows_path.as_path(), content.as_str())
    }

    fn log_added(&mut self, schema: &Schema, record: &Record) -> Result<(), StoreError> {
        let Some(log_path) = self.log_path.as_ref() else {
            return Ok(());
        };
        let line = serde_json::to_string(&record_to_object(schema, record)).map_err(io_error)?;
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path.as_path())
            .map_err(io_error)?;
        writeln!(file, "{line}").map_err(io_error)
    }
}

/// CSV file with a header row that must name the schema's columns. Date
/// columns are re-formatted to ISO on read; unrecognized date text passes
/// through as entered.
pub struct CsvBackend {
    path: PathBuf,
}

impl CsvBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Backend for CsvBackend {
    fn read(&mut self, schema: &Schema) -> Result<Vec<Record>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(self.path.as_path()).map_err(io_error)?;
        let rows = csv::parse_csv(raw.as_str());
        let Some((header, data_rows)) = rows.split_first() else {
            return Ok(Vec::new());
        };
        let expected = schema.header();
        if header != expected.as_slice() {
            return Err(StoreError::HeaderMismatch {
                expected,
                found: header.clone(),
            });
        }
        let mut records = Vec::with_capacity(data_rows.len());
        for (position, row) in data_rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(StoreError::Io {
                    detail: format!(
                        "row {position} has {} fields, expected {}",
                        row.len(),
                        schema.len()
                    ),
                });
            }
            let values = schema
                .columns()
                .iter()
                .zip(row.iter())
                .map(|(column, value)| match column.kind {
                    ColumnKind::Date => reformat_date(value.as_str()),
                    _ => value.clone(),
                })
                .collect();
            records.push(Record::from_values(values));
        }
        Ok(records)
    }

    fn write(&mut self, schema: &Schema, records: &[Record]) -> Result<(), StoreError> {
        let content = csv::rows_to_csv(schema, records);
        write_text_file(self.path.as_path(), content.as_str())
    }
}

/// Rows JSON wrapped in the password envelope. The salt is drawn once and
/// reused so the derived key survives across writes; an envelope that fails
/// to authenticate surfaces as an error instead of an empty table.
pub struct EncryptedFileBackend {
    path: PathBuf,
    password: String,
    cached: Option<(Vec<u8>, [u8; 32])>,
}

impl EncryptedFileBackend {
    pub fn new(path: PathBuf, password: &str) -> Self {
        Self {
            path,
            password: password.to_string(),
            cached: None,
        }
    }

    fn key_for_salt(&mut self, salt: Vec<u8>) -> [u8; 32] {
        match self.cached.as_ref() {
            Some((cached_salt, cached_key)) if *cached_salt == salt => *cached_key,
            _ => {
                let key = derive_key(self.password.as_str(), salt.as_slice(), PBKDF2_ITERATIONS);
                self.cached = Some((salt, key));
                key
            }
        }
    }
}

impl Backend for EncryptedFileBackend {
    fn read(&mut self, schema: &Schema) -> Result<Vec<Record>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(self.path.as_path()).map_err(io_error)?;
        let envelope: CryptoEnvelope = serde_json::from_str(raw.as_str()).map_err(io_error)?;
        let salt = decode_b64(envelope.salt.as_str())?;
        if salt.is_empty() {
            return Err(StoreError::Io {
                detail: "encrypted store has an empty salt".to_string(),
            });
        }
        let key = self.key_for_salt(salt);
        let decrypted = match decrypt_envelope_with_key(&envelope, &key)? {
            Some(text) => text,
            None => {
                // Drop the cached key so a corrected password re-derives.
                self.cached = None;
                return Err(StoreError::Io {
                    detail: "unable to decrypt the store (wrong password or corrupt file)"
                        .to_string(),
                });
            }
        };
        let value: serde_json::Value =
            serde_json::from_str(decrypted.as_str()).map_err(io_error)?;
        rows_from_value(schema, &value)
    }

    fn write(&mut self, schema: &Schema, records: &[Record]) -> Result<(), StoreError> {
        let value = rows_to_value(schema, records);
        let plaintext = serde_json::to_string(&value).map_err(io_error)?;
        let (salt, key) = match self.cached.as_ref() {
            Some((salt, key)) => (salt.clone(), *key),
            None => {
                let salt = fresh_salt().to_vec();
                let key = derive_key(self.password.as_str(), salt.as_slice(), PBKDF2_ITERATIONS);
                self.cached = Some((salt.clone(), key));
                (salt, key)
            }
        };
        let envelope = encrypt_text_with_key(plaintext.as_str(), salt.as_slice(), &key)?;
        let content = serde_json::to_string(&envelope).map_err(io_error)?;
        write_text_file(self.path.as_path(), content.as_str())
    }
}

/// Accepts slash and two-digit-year forms and re-formats to `YYYY-MM-DD`;
/// anything unrecognized is returned as entered.
pub fn reformat_date(value: &str) -> String {
    let trimmed = value.trim();
    // `%y` before `%Y`: chrono's `%Y` accepts a two-digit year, which would
    // turn "1/5/24" into year 24. A four-digit year fails `%y` on the two
    // trailing digits, so each input matches exactly one of the slash forms.
    for format in ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    value.to_string()
}

fn record_to_object(schema: &Schema, record: &Record) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (column, value) in schema.columns().iter().zip(record.values()) {
        object.insert(
            column.name.clone(),
            serde_json::Value::String(value.clone()),
        );
    }
    serde_json::Value::Object(object)
}

fn rows_to_value(schema: &Schema, records: &[Record]) -> serde_json::Value {
    serde_json::Value::Array(
        records
            .iter()
            .map(|record| record_to_object(schema, record))
            .collect(),
    )
}

fn rows_from_value(schema: &Schema, value: &serde_json::Value) -> Result<Vec<Record>, StoreError> {
    let rows = value.as_array().ok_or_else(|| StoreError::Io {
        detail: "rows file is not a JSON array".to_string(),
    })?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let values = schema
            .columns()
            .iter()
            .map(|column| value_string(row.get(column.name.as_str())))
            .collect();
        records.push(Record::from_values(values));
    }
    Ok(records)
}

fn value_string(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Number(number)) => number.to_string(),
        Some(serde_json::Value::Bool(boolean)) => boolean.to_string(),
        _ => String::new(),
    }
}

fn write_text_file(path: &Path, content: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, content).map_err(io_error)
}

fn io_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Io {
        detail: err.to_string(),
    }
}
