//! SQLite storage backend
//!
//! Uses parameterized queries for all values. Identifiers come from
//! registered schemas and are always quoted.
//! Every append runs in a single transaction: either all rows land or none do.

use crate::error::{PersistError, PersistErrorKind};
use crate::schema::TableSchema;
use crate::store::StorageBackend;
use bettr_common::{ExistingKeySet, Key, Row, Value};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Result type for connection-level operations
pub type DbResult<T> = rusqlite::Result<T>;

/// SQLite-backed store, one connection shared behind a mutex
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    ///
    /// `busy_timeout` bounds how long a write waits on a lock held by another
    /// connection before failing with a transient error.
    pub fn open(path: &Path, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers proceed while a sync is writing
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::info!("Opened database: {} (journal mode {})", path.display(), mode);
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, mostly for tests and dry runs
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Number of rows stored in a table
    pub fn row_count(&self, table: &str) -> DbResult<i64> {
        self.lock().query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )
    }

    /// Run a read against the underlying connection
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for SqliteStore {
    /// Create the table if it doesn't exist, then check the stored table has
    /// every column of the schema.
    fn ensure_table(&self, schema: &TableSchema) -> Result<(), PersistError> {
        let conn = self.lock();
        conn.execute_batch(&create_table_sql(schema))
            .map_err(|e| classify(schema.name(), e))?;

        let stored: Vec<String> = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(schema.name())))
            .and_then(|mut stmt| {
                stmt.query_map([], |row| row.get::<_, String>(1))?
                    .collect::<DbResult<Vec<_>>>()
            })
            .map_err(|e| classify(schema.name(), e))?;

        let missing: Vec<&str> = schema
            .column_names()
            .filter(|name| !stored.iter().any(|s| s == name))
            .collect();
        if !missing.is_empty() {
            return Err(PersistError::new(
                schema.name(),
                PersistErrorKind::SchemaMismatch,
                format!("stored table is missing column(s): {}", missing.join(", ")),
            ));
        }

        log::debug!("Table {} ready", schema.name());
        Ok(())
    }

    fn existing_keys(&self, schema: &TableSchema) -> Result<ExistingKeySet, PersistError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM {}",
            quote_ident(schema.primary_key()),
            quote_ident(schema.name())
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| classify(schema.name(), e))?;
        let mut rows = stmt.query([]).map_err(|e| classify(schema.name(), e))?;

        let mut keys = ExistingKeySet::new();
        while let Some(row) = rows.next().map_err(|e| classify(schema.name(), e))? {
            match row.get_ref(0).map_err(|e| classify(schema.name(), e))? {
                ValueRef::Integer(i) => {
                    keys.insert(Key::Int(i));
                }
                ValueRef::Text(bytes) => {
                    keys.insert(Key::Text(String::from_utf8_lossy(bytes).into_owned()));
                }
                other => {
                    log::warn!(
                        "Ignoring stored key of type {} in {}",
                        other.data_type(),
                        schema.name()
                    );
                }
            }
        }

        log::debug!("Loaded {} existing keys from {}", keys.len(), schema.name());
        Ok(keys)
    }

    fn append_rows(&self, schema: &TableSchema, rows: &[Row]) -> Result<usize, PersistError> {
        let mut conn = self.lock();
        append_rows_conn(&mut conn, schema, rows).map_err(|e| classify(schema.name(), e))
    }
}

fn append_rows_conn(conn: &mut Connection, schema: &TableSchema, rows: &[Row]) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare_cached(&insert_sql(schema))?;
        for row in rows {
            let values = schema
                .column_names()
                .map(|name| row.get(name).map(to_sql_value).unwrap_or(rusqlite::types::Value::Null));
            stmt.execute(params_from_iter(values))?;
            count += 1;
        }
    }
    tx.commit()?;

    log::info!("Appended {} rows to {}", count, schema.name());
    Ok(count)
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int(i) => Sql::Integer(*i),
        Value::Float(f) => Sql::Real(*f),
        Value::Text(s) => Sql::Text(s.clone()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL for a schema: affinities, not-null, primary key and foreign keys
fn create_table_sql(schema: &TableSchema) -> String {
    let mut defs: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.column_type.sql_affinity());
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if c.primary_key {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect();

    for rel in schema.relationships() {
        if let Some(fk) = &rel.foreign_key {
            // Without a column list the parent's primary key is referenced
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}",
                quote_ident(fk),
                quote_ident(&rel.target)
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote_ident(schema.name()),
        defs.join(",\n    ")
    )
}

fn insert_sql(schema: &TableSchema) -> String {
    let columns: Vec<String> = schema.column_names().map(quote_ident).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(schema.name()),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Map a SQLite failure onto the retry classification
fn classify(table: &str, err: rusqlite::Error) -> PersistError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, msg) => match e.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::OutOfMemory => PersistErrorKind::Transient,
            ErrorCode::ConstraintViolation
            | ErrorCode::TypeMismatch
            | ErrorCode::SchemaChanged => PersistErrorKind::SchemaMismatch,
            _ if msg.as_deref().is_some_and(is_schema_message) => PersistErrorKind::SchemaMismatch,
            _ => PersistErrorKind::Permanent,
        },
        _ => PersistErrorKind::Permanent,
    };
    PersistError::new(table, kind, err.to_string())
}

fn is_schema_message(msg: &str) -> bool {
    msg.starts_with("no such table")
        || msg.starts_with("no such column")
        || msg.contains("has no column named")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ModelDescriptor, Relationship};
    use bettr_common::{row, ColumnType};
    use rusqlite::ffi;

    fn schema() -> TableSchema {
        TableSchema::from_model(
            &ModelDescriptor::new("TeamGameLog")
                .column(ColumnDef::new("game_id", ColumnType::Text).primary_key())
                .column(ColumnDef::new("team_id", ColumnType::Integer).required())
                .column(ColumnDef::new("points", ColumnType::Integer))
                .column(ColumnDef::new("home", ColumnType::Boolean))
                .relationship(Relationship::new("team", "Team").via("team_id")),
        )
        .unwrap()
    }

    fn test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&schema()).unwrap();
        store
    }

    fn game(id: &str, points: i64) -> Row {
        row([
            ("game_id", Value::from(id)),
            ("team_id", Value::from(1i64)),
            ("points", Value::from(points)),
            ("home", Value::from(true)),
        ])
    }

    #[test]
    fn create_table_sql_declares_keys() {
        let sql = create_table_sql(&schema());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"team_game_log\""));
        assert!(sql.contains("\"game_id\" TEXT NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"points\" INTEGER,"));
        assert!(sql.contains("FOREIGN KEY (\"team_id\") REFERENCES \"team\""));
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn ensure_table_creates_table_and_is_idempotent() {
        let store = test_store();
        store.ensure_table(&schema()).unwrap();
        let count: i64 = store.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='team_game_log'",
                [],
                |row| row.get(0),
            )
            .unwrap()
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn ensure_table_detects_missing_columns() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE team_game_log (game_id TEXT PRIMARY KEY)")
                .unwrap()
        });
        let err = store.ensure_table(&schema()).unwrap_err();
        assert_eq!(err.kind, PersistErrorKind::SchemaMismatch);
        assert!(err.message.contains("team_id"));
    }

    #[test]
    fn append_then_read_keys() {
        let store = test_store();
        let written = store
            .append_rows(&schema(), &[game("G1", 100), game("G2", 98)])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.row_count("team_game_log").unwrap(), 2);

        let keys = store.existing_keys(&schema()).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&Key::from("G1")));
    }

    #[test]
    fn absent_nullable_values_are_stored_as_null() {
        let store = test_store();
        let sparse = row([("game_id", Value::from("G1")), ("team_id", Value::from(1i64))]);
        store.append_rows(&schema(), &[sparse]).unwrap();

        let points: Option<i64> = store.with_connection(|conn| {
            conn.query_row("SELECT points FROM team_game_log", [], |row| row.get(0))
                .unwrap()
        });
        assert!(points.is_none());
    }

    #[test]
    fn failed_append_leaves_no_rows() {
        let store = test_store();
        store.append_rows(&schema(), &[game("G1", 100)]).unwrap();

        // G1 collides with the stored key halfway through the batch
        let err = store
            .append_rows(&schema(), &[game("G2", 1), game("G1", 2), game("G3", 3)])
            .unwrap_err();
        assert_eq!(err.kind, PersistErrorKind::SchemaMismatch);
        assert_eq!(store.row_count("team_game_log").unwrap(), 1);
    }

    #[test]
    fn integer_keys_round_trip() {
        let team = TableSchema::from_model(
            &ModelDescriptor::new("Team")
                .column(ColumnDef::new("team_id", ColumnType::Integer).primary_key()),
        )
        .unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&team).unwrap();
        store
            .append_rows(&team, &[row([("team_id", 1610612747i64)])])
            .unwrap();
        let keys = store.existing_keys(&team).unwrap();
        assert!(keys.contains(&Key::Int(1610612747)));
    }

    #[test]
    fn classify_busy_and_locked_as_transient() {
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
            let err = rusqlite::Error::SqliteFailure(ffi::Error::new(code), None);
            assert!(classify("t", err).is_transient());
        }
    }

    #[test]
    fn classify_missing_table_as_schema_mismatch() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.existing_keys(&schema()).unwrap_err();
        assert_eq!(err.kind, PersistErrorKind::SchemaMismatch);
    }
}
