use std::collections::BTreeSet;
use std::fmt;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::record::{normalize, RawFields, Record};
use crate::schema::Schema;

#[derive(Clone, Copy, Debug, Default)]
pub struct StoreConfig {
    /// Display ordering applied once at open: newest date first, stable for
    /// ties. Not a stored invariant; adds still append at the end.
    pub sort_by_date_descending: bool,
}

/// The ordered record table. Every mutation runs through the normalizer, then
/// persists the entire sequence; a rejected write rolls the in-memory change
/// back so memory never diverges from storage.
///
/// Records are addressed by position only. An index is valid until the next
/// add or delete, which renumbers the sequence contiguously from 0.
pub struct RecordStore {
    schema: Schema,
    backend: Box<dyn Backend>,
    records: Vec<Record>,
}

// The backend trait object has no Debug bound, so the impl is by hand.
impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("schema", &self.schema)
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    pub fn open(
        schema: Schema,
        mut backend: Box<dyn Backend>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let mut records = backend.read(&schema)?;
        if config.sort_by_date_descending {
            if let Some(position) = schema.date_position() {
                // ISO dates compare lexicographically, so no parsing here.
                records.sort_by(|a, b| b.values()[position].cmp(&a.values()[position]));
            }
        }
        Ok(Self {
            schema,
            backend,
            records,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn list(&self) -> &[Record] {
        self.records.as_slice()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Normalize, append, persist, then append to the backend's add-log.
    /// Validation failure mutates nothing; a failed write pops the append.
    /// A failed log append also pops it and rewrites the table without the
    /// row, so an error from `add` always means the record was not kept and
    /// a retry cannot duplicate it.
    pub fn add(&mut self, raw: &RawFields) -> Result<(), StoreError> {
        let record = normalize(&self.schema, raw)?;
        self.records.push(record.clone());
        if let Err(err) = self.backend.write(&self.schema, self.records.as_slice()) {
            self.records.pop();
            return Err(err);
        }
        if let Err(err) = self.backend.log_added(&self.schema, &record) {
            self.records.pop();
            self.backend.write(&self.schema, self.records.as_slice())?;
            return Err(err);
        }
        Ok(())
    }

    /// Replace the record at `index`. The stored record is untouched on
    /// validation failure and restored on a failed write.
    pub fn update(&mut self, index: usize, raw: &RawFields) -> Result<(), StoreError> {
        if index >= self.records.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        let record = normalize(&self.schema, raw)?;
        let previous = std::mem::replace(&mut self.records[index], record);
        if let Err(err) = self.backend.write(&self.schema, self.records.as_slice()) {
            self.records[index] = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn delete_one(&mut self, index: usize) -> Result<(), StoreError> {
        let mut indexes = BTreeSet::new();
        indexes.insert(index);
        self.delete(&indexes)
    }

    /// Remove a set of positions, all-or-nothing: every index is validated
    /// before anything moves. Survivors keep their relative order and are
    /// renumbered contiguously from 0.
    pub fn delete(&mut self, indexes: &BTreeSet<usize>) -> Result<(), StoreError> {
        if indexes.is_empty() {
            return Ok(());
        }
        for &index in indexes {
            if index >= self.records.len() {
                return Err(StoreError::IndexOutOfRange {
                    index,
                    len: self.records.len(),
                });
            }
        }
        let previous = self.records.clone();
        let mut position = 0usize;
        self.records.retain(|_| {
            let keep = !indexes.contains(&position);
            position += 1;
            keep
        });
        if let Err(err) = self.backend.write(&self.schema, self.records.as_slice()) {
            self.records = previous;
            return Err(err);
        }
        Ok(())
    }

    /// CSV import path: normalize and append row by row, stopping at the
    /// first failure. Rows appended before the failure stay in place and are
    /// persisted; the failure reports the 0-based row and its cause. Returns
    /// the number of rows appended on full success.
    pub fn bulk_load(&mut self, rows: &[RawFields]) -> Result<usize, StoreError> {
        let start = self.records.len();
        for (position, raw) in rows.iter().enumerate() {
            match normalize(&self.schema, raw) {
                Ok(record) => self.records.push(record),
                Err(cause) => {
                    self.persist_appended(start)?;
                    return Err(StoreError::ImportFailed {
                        row: position,
                        cause: Box::new(cause),
                    });
                }
            }
        }
        self.persist_appended(start)?;
        Ok(self.records.len() - start)
    }

    fn persist_appended(&mut self, start: usize) -> Result<(), StoreError> {
        if self.records.len() == start {
            return Ok(());
        }
        if let Err(err) = self.backend.write(&self.schema, self.records.as_slice()) {
            self.records.truncate(start);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn raw(values: &[&str]) -> RawFields {
        RawFields::new(values.iter().map(|value| value.to_string()).collect())
    }

    fn compact_row(date: &str, client: &str, code: &str) -> RawFields {
        raw(&[date, client, "Jane", "reporting", "some notes", code])
    }

    fn open_store() -> RecordStore {
        RecordStore::open(
            Schema::compact(),
            Box::new(MemoryBackend::new()),
            StoreConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn add_appends_exactly_one_record() {
        let mut store = open_store();
        store
            .add(&compact_row("2024-01-01", "Acme", "{\"a\":1}"))
            .unwrap();
        assert_eq!(store.len(), 1);
        let schema = store.schema().clone();
        assert_eq!(
            store.list()[0].get(&schema, "Code"),
            Some("{\n    \"a\": 1\n}")
        );
    }

    #[test]
    fn add_with_invalid_code_leaves_the_table_empty() {
        let mut store = open_store();
        let err = store
            .add(&compact_row("2024-01-01", "Acme", "not json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCode { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn update_replaces_only_the_target_position() {
        let mut store = open_store();
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        store.add(&compact_row("2024-01-02", "Globex", "")).unwrap();
        store
            .update(1, &compact_row("2024-01-03", "Initech", "{\"x\": 2}"))
            .unwrap();
        let schema = store.schema().clone();
        assert_eq!(store.list()[0].get(&schema, "Client"), Some("Acme"));
        assert_eq!(store.list()[1].get(&schema, "Client"), Some("Initech"));
        let expected = normalize(
            &schema,
            &compact_row("2024-01-03", "Initech", "{\"x\": 2}"),
        )
        .unwrap();
        assert_eq!(store.list()[1], expected);
    }

    #[test]
    fn update_out_of_range_is_rejected() {
        let mut store = open_store();
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        let err = store
            .update(3, &compact_row("2024-01-02", "Globex", ""))
            .unwrap_err();
        assert_eq!(err, StoreError::IndexOutOfRange { index: 3, len: 1 });
    }

    #[test]
    fn update_with_invalid_code_keeps_the_stored_record() {
        let mut store = open_store();
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        let before = store.list()[0].clone();
        let err = store
            .update(0, &compact_row("2024-01-02", "Globex", "{broken"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCode { .. }));
        assert_eq!(store.list()[0], before);
    }

    #[test]
    fn delete_renumbers_survivors_in_order() {
        let mut store = open_store();
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        store.add(&compact_row("2024-01-02", "Globex", "")).unwrap();
        store.add(&compact_row("2024-01-03", "Initech", "")).unwrap();
        store.delete_one(1).unwrap();
        let schema = store.schema().clone();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[0].get(&schema, "Client"), Some("Acme"));
        assert_eq!(store.list()[1].get(&schema, "Client"), Some("Initech"));
    }

    #[test]
    fn delete_set_removes_exactly_that_many() {
        let mut store = open_store();
        for day in ["01", "02", "03", "04"] {
            store
                .add(&compact_row(&format!("2024-01-{day}"), "Acme", ""))
                .unwrap();
        }
        let indexes: BTreeSet<usize> = [0, 2].into_iter().collect();
        store.delete(&indexes).unwrap();
        let schema = store.schema().clone();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[0].get(&schema, "Date"), Some("2024-01-02"));
        assert_eq!(store.list()[1].get(&schema, "Date"), Some("2024-01-04"));
    }

    #[test]
    fn delete_is_all_or_nothing_on_a_bad_index() {
        let mut store = open_store();
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        store.add(&compact_row("2024-01-02", "Globex", "")).unwrap();
        let indexes: BTreeSet<usize> = [1, 5].into_iter().collect();
        let err = store.delete(&indexes).unwrap_err();
        assert_eq!(err, StoreError::IndexOutOfRange { index: 5, len: 2 });
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn bulk_load_stops_at_the_first_bad_row() {
        let mut store = open_store();
        let rows = vec![
            compact_row("2024-01-01", "Acme", "{\"a\": 1}"),
            compact_row("2024-01-02", "Globex", "definitely not json"),
            compact_row("2024-01-03", "Initech", ""),
        ];
        let err = store.bulk_load(rows.as_slice()).unwrap_err();
        match err {
            StoreError::ImportFailed { row, cause } => {
                assert_eq!(row, 1);
                assert!(matches!(*cause, StoreError::InvalidCode { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let schema = store.schema().clone();
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].get(&schema, "Client"), Some("Acme"));
    }

    #[test]
    fn bulk_load_reports_the_appended_count() {
        let mut store = open_store();
        let rows = vec![
            compact_row("2024-01-01", "Acme", ""),
            compact_row("2024-01-02", "Globex", "[1, 2]"),
        ];
        assert_eq!(store.bulk_load(rows.as_slice()).unwrap(), 2);
    }

    #[test]
    fn failed_write_rolls_back_an_add() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_write();
        let mut store = RecordStore::open(
            Schema::compact(),
            Box::new(backend),
            StoreConfig::default(),
        )
        .unwrap();
        let err = store
            .add(&compact_row("2024-01-01", "Acme", ""))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.is_empty());
        // Backend recovered; a retry goes through with nothing lost.
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        assert_eq!(store.len(), 1);
    }

    struct RejectingLogBackend {
        inner: MemoryBackend,
        fail_log: bool,
    }

    impl Backend for RejectingLogBackend {
        fn read(&mut self, schema: &Schema) -> Result<Vec<Record>, StoreError> {
            self.inner.read(schema)
        }

        fn write(&mut self, schema: &Schema, records: &[Record]) -> Result<(), StoreError> {
            self.inner.write(schema, records)
        }

        fn log_added(&mut self, _schema: &Schema, _record: &Record) -> Result<(), StoreError> {
            if self.fail_log {
                self.fail_log = false;
                return Err(StoreError::Io {
                    detail: "log append rejected".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn failed_log_append_rolls_back_the_add() {
        let backend = RejectingLogBackend {
            inner: MemoryBackend::new(),
            fail_log: true,
        };
        let mut store = RecordStore::open(
            Schema::compact(),
            Box::new(backend),
            StoreConfig::default(),
        )
        .unwrap();
        let err = store
            .add(&compact_row("2024-01-01", "Acme", ""))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.is_empty());
        // The failed add was fully undone, so the retry does not duplicate.
        store.add(&compact_row("2024-01-01", "Acme", "")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_write_rolls_back_an_update() {
        let schema = Schema::compact();
        let original = normalize(&schema, &compact_row("2024-01-01", "Acme", "")).unwrap();
        let mut backend = MemoryBackend::new();
        backend.write(&schema, &[original.clone()]).unwrap();
        backend.fail_next_write();
        let mut store =
            RecordStore::open(schema, Box::new(backend), StoreConfig::default()).unwrap();
        let err = store
            .update(0, &compact_row("2024-02-02", "Globex", ""))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.list()[0], original);
    }

    #[test]
    fn failed_write_rolls_back_a_bulk_load() {
        let mut backend = MemoryBackend::new();
        backend.fail_next_write();
        let mut store = RecordStore::open(
            Schema::compact(),
            Box::new(backend),
            StoreConfig::default(),
        )
        .unwrap();
        let rows = vec![
            compact_row("2024-01-01", "Acme", ""),
            compact_row("2024-01-02", "Globex", ""),
        ];
        let err = store.bulk_load(rows.as_slice()).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn debug_output_skips_the_backend() {
        let store = open_store();
        let rendered = format!("{store:?}");
        assert!(rendered.contains("RecordStore"));
        assert!(!rendered.contains("backend"));
    }

    #[test]
    fn failed_write_rolls_back_a_delete() {
        let schema = Schema::compact();
        let rows = [
            compact_row("2024-01-01", "Acme", ""),
            compact_row("2024-01-02", "Globex", ""),
        ];
        let records: Vec<Record> = rows
            .iter()
            .map(|row| normalize(&schema, row).unwrap())
            .collect();
        let mut backend = MemoryBackend::new();
        backend.write(&schema, records.as_slice()).unwrap();
        backend.fail_next_write();
        let mut store =
            RecordStore::open(schema, Box::new(backend), StoreConfig::default()).unwrap();
        let err = store.delete_one(0).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn open_can_sort_by_date_descending() {
        let schema = Schema::compact();
        let mut backend = MemoryBackend::new();
        let rows = [
            compact_row("2024-01-02", "Globex", ""),
            compact_row("2024-03-01", "Initech", ""),
            compact_row("2024-01-02", "Acme", ""),
        ];
        let records: Vec<Record> = rows
            .iter()
            .map(|row| normalize(&schema, row).unwrap())
            .collect();
        backend.write(&schema, records.as_slice()).unwrap();
        let store = RecordStore::open(
            schema.clone(),
            Box::new(backend),
            StoreConfig {
                sort_by_date_descending: true,
            },
        )
        .unwrap();
        let clients: Vec<&str> = store
            .list()
            .iter()
            .map(|record| record.get(&schema, "Client").unwrap())
            .collect();
        // Stable sort: equal dates keep their stored order.
        assert_eq!(clients, vec!["Initech", "Globex", "Acme"]);
    }
}
