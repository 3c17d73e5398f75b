//! bettr sync - sports statistics into SQLite
//!
//! Reconciles freshly fetched record batches against a persisted table:
//! resolves the table schema from a model, drops rows whose primary key is
//! already stored, validates what is left and appends it in one transaction.

pub mod dedup;
pub mod error;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod store;
pub mod validate;

pub use bettr_common::{row, ColumnType, ExistingKeySet, Key, RecordBatch, Row, Value};
pub use error::{
    PersistError, PersistErrorKind, Result, RowFailure, RowFailureReason, SchemaError, SourceError,
    SyncError, ValidationError,
};
pub use persist::RetryPolicy;
pub use pipeline::{RowError, SyncOptions, SyncResult, SyncStage, Syncer};
pub use schema::{table_name, ColumnDef, ModelDescriptor, Relationship, SchemaRegistry, TableSchema};
pub use store::{MemoryStore, SqliteStore, StorageBackend};
pub use validate::{ValidationMode, Validator};
