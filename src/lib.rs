//! Client query log: a fixed-schema row table with add/update/delete/import
//! operations, canonical JSON formatting for the embedded code field, and
//! whole-table persistence through swappable backends.

pub mod backend;
pub mod crypto;
pub mod csv;
pub mod error;
pub mod record;
pub mod schema;
pub mod session;
pub mod store;

pub use backend::{Backend, CsvBackend, EncryptedFileBackend, FileBackend, MemoryBackend};
pub use error::StoreError;
pub use record::{normalize, RawFields, Record};
pub use schema::{Column, ColumnKind, Schema};
pub use session::{FormMode, SessionState};
pub use store::{RecordStore, StoreConfig};
