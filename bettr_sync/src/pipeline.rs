//! The synchronization pipeline
//!
//! One call runs `Fetched -> SchemaResolved -> Deduped -> Validated -> Persisted`
//! and ends there or in `Failed`. Calls for the same table are serialized so
//! that reading persisted keys and appending new rows can't interleave; calls
//! for different tables run independently.

use crate::dedup;
use crate::error::{PersistError, Result, SyncError};
use crate::persist::{Persister, RetryPolicy};
use crate::schema::{ModelDescriptor, SchemaRegistry, TableSchema};
use crate::store::StorageBackend;
use crate::validate::{ValidationMode, Validator};
use bettr_common::{RecordBatch, Row};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of one synchronization call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Rows written
    pub inserted_count: usize,
    /// Rows not written: already persisted, repeated within the batch, or
    /// left out as invalid
    pub skipped_count: usize,
    /// Rows left out as invalid (skip-invalid mode only)
    pub errors: Vec<RowError>,
}

/// A row left out of the write, by its index in the incoming batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row_index: usize,
    pub reason: String,
}

/// Where a synchronization call is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStage {
    Fetched,
    SchemaResolved,
    Deduped,
    Validated,
    Persisted,
    Failed(String),
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::Fetched => write!(f, "fetched"),
            SyncStage::SchemaResolved => write!(f, "schema resolved"),
            SyncStage::Deduped => write!(f, "deduped"),
            SyncStage::Validated => write!(f, "validated"),
            SyncStage::Persisted => write!(f, "persisted"),
            SyncStage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Strict rejects fields that aren't columns; lenient drops them
    pub mode: ValidationMode,
    /// Leave invalid rows out instead of failing the batch
    pub skip_invalid: bool,
    pub retry: RetryPolicy,
}

/// Runs synchronization calls against one storage backend
pub struct Syncer<B> {
    registry: SchemaRegistry,
    backend: B,
    options: SyncOptions,
    table_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    prepared: Mutex<HashSet<String>>,
}

impl<B: StorageBackend> Syncer<B> {
    pub fn new(backend: B, options: SyncOptions) -> Self {
        Self {
            registry: SchemaRegistry::new(),
            backend,
            options,
            table_locks: Mutex::new(HashMap::new()),
            prepared: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronize a batch for a model, registering the model on first use
    pub fn sync(&self, model: &ModelDescriptor, batch: RecordBatch) -> Result<SyncResult> {
        let table = model.table_name();
        advance(&table, &SyncStage::Fetched);

        let schema = self
            .registry
            .register(model)
            .map_err(|e| failed(&table, e))?;
        self.run(&schema, batch)
    }

    /// Synchronize a batch for an already registered table
    pub fn sync_table(&self, table: &str, batch: RecordBatch) -> Result<SyncResult> {
        advance(table, &SyncStage::Fetched);

        let schema = self.registry.get(table).map_err(|e| failed(table, e))?;
        self.run(&schema, batch)
    }

    fn run(&self, schema: &TableSchema, batch: RecordBatch) -> Result<SyncResult> {
        let table = schema.name();
        advance(table, &SyncStage::SchemaResolved);

        // An empty batch never reaches the backend
        if batch.is_empty() {
            log::info!("Empty batch for {}, nothing to sync", table);
            return Ok(SyncResult::default());
        }

        let lock = self.table_lock(table);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.prepare(schema).map_err(|e| failed(table, e))?;

        let total = batch.len();
        let existing = self
            .backend
            .existing_keys(schema)
            .map_err(|e| failed(table, e))?;
        let keep = dedup::retain_new(&batch, schema, &existing);
        let mut skipped = total - keep.len();
        advance(table, &SyncStage::Deduped);

        if keep.is_empty() {
            log::info!("All primary keys already in {} ({} rows skipped)", table, skipped);
            return Ok(SyncResult {
                inserted_count: 0,
                skipped_count: skipped,
                errors: Vec::new(),
            });
        }

        let mut rows: Vec<Option<Row>> = batch.into_rows().into_iter().map(Some).collect();
        let tagged = keep.iter().filter_map(|&i| rows[i].take().map(|row| (i, row)));

        let checked = Validator::new(self.options.mode)
            .skip_invalid(self.options.skip_invalid)
            .check(tagged, schema)
            .map_err(|e| failed(table, e))?;

        let rejected_rows: BTreeSet<usize> = checked.rejected.iter().map(|f| f.row_index).collect();
        skipped += rejected_rows.len();
        let errors: Vec<RowError> = checked
            .rejected
            .iter()
            .map(|f| RowError {
                row_index: f.row_index,
                reason: format!("{}: {}", f.column, f.reason),
            })
            .collect();
        if !errors.is_empty() {
            log::warn!(
                "Leaving {} invalid rows out of {} ({} failures)",
                rejected_rows.len(),
                table,
                errors.len()
            );
        }
        advance(table, &SyncStage::Validated);

        if checked.accepted.is_empty() {
            log::info!("No valid new rows for {}", table);
            return Ok(SyncResult {
                inserted_count: 0,
                skipped_count: skipped,
                errors,
            });
        }

        let new_rows: RecordBatch = checked.accepted.into_iter().map(|(_, row)| row).collect();
        let mut result = Persister::new(&self.backend, self.options.retry)
            .append(&new_rows, schema)
            .map_err(|e| failed(table, e))?;
        result.skipped_count = skipped;
        result.errors = errors;
        advance(table, &SyncStage::Persisted);

        log::info!(
            "Successfully saved {} rows to {} ({} skipped)",
            result.inserted_count,
            table,
            result.skipped_count
        );
        Ok(result)
    }

    /// Create backend storage for a table once per syncer
    fn prepare(&self, schema: &TableSchema) -> std::result::Result<(), PersistError> {
        // The caller holds the table lock, so only one call can prepare a table.
        // The set lock is released across the backend call.
        if self.is_prepared(schema.name()) {
            return Ok(());
        }
        self.backend.ensure_table(schema)?;
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.name().to_string());
        Ok(())
    }

    fn is_prepared(&self, table: &str) -> bool {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(table)
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.table_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(table.to_string()).or_default())
    }
}

fn advance(table: &str, stage: &SyncStage) {
    log::debug!("{}: {}", table, stage);
}

fn failed(table: &str, err: impl Into<SyncError>) -> SyncError {
    let err = err.into();
    advance(table, &SyncStage::Failed(err.to_string()));
    err
}
