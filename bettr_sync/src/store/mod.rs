//! Storage backends
//!
//! The pipeline depends on exactly two backend operations: reading the keys
//! already persisted for a table and appending a batch of rows. Any store that
//! offers those, with all-or-nothing appends, can back a sync.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::PersistError;
use crate::schema::TableSchema;
use bettr_common::{ExistingKeySet, Row};

/// A store that persisted tables live in
pub trait StorageBackend: Send + Sync {
    /// Prepare storage for a table. Must be idempotent.
    fn ensure_table(&self, _schema: &TableSchema) -> Result<(), PersistError> {
        Ok(())
    }

    /// Primary-key values already persisted for the table
    fn existing_keys(&self, schema: &TableSchema) -> Result<ExistingKeySet, PersistError>;

    /// Append rows in one all-or-nothing write, returning the number written
    fn append_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<usize, PersistError>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn ensure_table(&self, schema: &TableSchema) -> Result<(), PersistError> {
        (**self).ensure_table(schema)
    }

    fn existing_keys(&self, schema: &TableSchema) -> Result<ExistingKeySet, PersistError> {
        (**self).existing_keys(schema)
    }

    fn append_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<usize, PersistError> {
        (**self).append_rows(schema, rows)
    }
}
