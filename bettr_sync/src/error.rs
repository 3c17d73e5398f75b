//! Error types for bettr_sync
//!
//! One error enum per pipeline stage. `SyncError` wraps them for the single
//! public `sync` entry point.

use std::fmt;
use thiserror::Error;

/// Schema registration or lookup failure. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("model {model} declares no primary key column")]
    MissingPrimaryKey { model: String },

    #[error("model {model} declares more than one primary key column: {columns:?}")]
    AmbiguousPrimaryKey { model: String, columns: Vec<String> },

    #[error("primary key {column} of model {model} must be a non-null integer or text column")]
    UnsupportedKeyType { model: String, column: String },

    #[error("model {model} declares column {column} more than once")]
    DuplicateColumn { model: String, column: String },

    #[error("invalid name {name:?} in model {model}")]
    InvalidName { model: String, name: String },

    #[error("relationship {relationship} of model {model} references unknown column {column}")]
    UnknownRelationshipColumn {
        model: String,
        relationship: String,
        column: String,
    },

    #[error("table {table} is already registered with a different definition")]
    Conflict { table: String },

    #[error("no schema registered for table {table}")]
    NotFound { table: String },
}

/// Why a single row was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFailureReason {
    /// Field not declared by the schema
    UnknownField,
    /// Primary key absent or null
    MissingPrimaryKey,
    /// Non-nullable column absent or null
    MissingRequired,
    /// Value does not match the declared column type
    TypeMismatch {
        expected: bettr_common::ColumnType,
        found: &'static str,
    },
}

impl fmt::Display for RowFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowFailureReason::UnknownField => write!(f, "field is not a column of the table"),
            RowFailureReason::MissingPrimaryKey => write!(f, "primary key value is missing"),
            RowFailureReason::MissingRequired => write!(f, "required value is missing"),
            RowFailureReason::TypeMismatch { expected, found } => {
                write!(f, "expected {} value, found {}", expected, found)
            }
        }
    }
}

/// A rejected row: its index in the incoming batch, the column and the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row_index: usize,
    pub column: String,
    pub reason: RowFailureReason,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}, column {}: {}", self.row_index, self.column, self.reason)
    }
}

/// Every failing row of a batch. The batch is never partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} row failure(s) validating batch for {table}{}", .failures.len(), summary(.failures))]
pub struct ValidationError {
    pub table: String,
    pub failures: Vec<RowFailure>,
}

impl ValidationError {
    /// Distinct row indices that failed, in ascending order
    pub fn failed_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.failures.iter().map(|f| f.row_index).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }
}

fn summary(failures: &[RowFailure]) -> String {
    match failures.first() {
        Some(first) if failures.len() == 1 => format!(": {}", first),
        Some(first) => format!(": {} (and {} more)", first, failures.len() - 1),
        None => String::new(),
    }
}

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistErrorKind {
    /// Busy, locked, connection or I/O failure; the write may be retried as a whole
    Transient,
    /// Rows don't fit the stored table (missing column, type or constraint clash)
    SchemaMismatch,
    /// Any other failure
    Permanent,
}

impl fmt::Display for PersistErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistErrorKind::Transient => write!(f, "transient"),
            PersistErrorKind::SchemaMismatch => write!(f, "schema mismatch"),
            PersistErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Storage backend failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} storage error on {table}: {message}")]
pub struct PersistError {
    pub table: String,
    pub kind: PersistErrorKind,
    pub message: String,
}

impl PersistError {
    pub fn new(table: impl Into<String>, kind: PersistErrorKind, message: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PersistErrorKind::Transient
    }
}

/// Failure of a data source producing a batch
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}

/// Any failure of a synchronization call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Result alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_message_summarises_failures() {
        let err = ValidationError {
            table: "team_game_log".to_string(),
            failures: vec![
                RowFailure {
                    row_index: 2,
                    column: "venue".to_string(),
                    reason: RowFailureReason::UnknownField,
                },
                RowFailure {
                    row_index: 2,
                    column: "game_id".to_string(),
                    reason: RowFailureReason::MissingPrimaryKey,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 row failure(s) validating batch for team_game_log: \
             row 2, column venue: field is not a column of the table (and 1 more)"
        );
        assert_eq!(err.failed_rows(), vec![2]);
    }

    #[test]
    fn persist_error_kind() {
        let err = PersistError::new("team", PersistErrorKind::Transient, "database is locked");
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "transient storage error on team: database is locked");
        assert!(!PersistError::new("team", PersistErrorKind::Permanent, "disk full").is_transient());
    }
}
