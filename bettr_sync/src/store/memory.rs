//! In-memory storage backend
//!
//! Keeps tables as row vectors and counts backend calls. Failures can be
//! queued to exercise the retry and atomicity paths.

use crate::error::{PersistError, PersistErrorKind};
use crate::schema::TableSchema;
use crate::store::StorageBackend;
use bettr_common::{ExistingKeySet, Row};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    queued_failures: Mutex<VecDeque<PersistErrorKind>>,
    key_reads: AtomicUsize,
    append_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `append_rows` call fail with the given kind
    pub fn fail_next_append(&self, kind: PersistErrorKind) {
        self.queued_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(kind);
    }

    /// Rows stored in a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables().get(table).map_or(0, Vec::len)
    }

    /// Number of `existing_keys` calls so far
    pub fn key_reads(&self) -> usize {
        self.key_reads.load(Ordering::SeqCst)
    }

    /// Number of `append_rows` calls so far, failed ones included
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Vec<Row>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryStore {
    fn ensure_table(&self, schema: &TableSchema) -> Result<(), PersistError> {
        self.tables().entry(schema.name().to_string()).or_default();
        Ok(())
    }

    fn existing_keys(&self, schema: &TableSchema) -> Result<ExistingKeySet, PersistError> {
        self.key_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables()
            .get(schema.name())
            .map(|rows| rows.iter().filter_map(|r| schema.key_of(r)).collect::<ExistingKeySet>())
            .unwrap_or_default())
    }

    fn append_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<usize, PersistError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .queued_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(kind) = queued {
            return Err(PersistError::new(schema.name(), kind, "injected failure"));
        }

        let mut tables = self.tables();
        let stored = tables.entry(schema.name().to_string()).or_default();

        // Check every key before touching the table so a clash writes nothing
        let mut keys: HashSet<_> = stored.iter().filter_map(|r| schema.key_of(r)).collect();
        for row in rows {
            let key = schema.key_of(row).ok_or_else(|| {
                PersistError::new(
                    schema.name(),
                    PersistErrorKind::SchemaMismatch,
                    format!("row has no {} value", schema.primary_key()),
                )
            })?;
            if !keys.insert(key.clone()) {
                return Err(PersistError::new(
                    schema.name(),
                    PersistErrorKind::SchemaMismatch,
                    format!("duplicate primary key {}", key),
                ));
            }
        }

        stored.extend_from_slice(rows);
        Ok(rows.len())
    }
}
