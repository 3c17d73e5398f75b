//! Shared types for bettr data sync
//!
//! Scalar values, rows and record batches exchanged between data sources,
//! the sync pipeline and storage backends.

pub mod batch;
pub mod value;

pub use batch::{row, ExistingKeySet, RecordBatch, Row};
pub use value::{ColumnType, Key, Value};
