//! CSV files exported from earlier fetches

use crate::error::SourceError;
use crate::schema::TableSchema;
use bettr_common::{ColumnType, RecordBatch, Row, Value};
use std::io::Read;
use std::path::{Path, PathBuf};

/// A CSV file with a header row
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file, typing cells by the schema's column types
    pub fn read(&self, schema: &TableSchema) -> Result<RecordBatch, SourceError> {
        log::info!("Reading {} from {}", schema.name(), self.path.display());
        let file = std::fs::File::open(&self.path)?;
        let batch = read_batch(file, schema)?;
        log::info!("Read {} rows from {}", batch.len(), self.path.display());
        Ok(batch)
    }
}

/// Read CSV records into a batch.
///
/// Headers are trimmed and lowercased (`TEAM_ID` -> `team_id`). Cells of
/// schema columns are parsed as the column's type; cells of other columns are
/// kept as text and left for validation to judge.
pub fn read_batch<R: Read>(reader: R, schema: &TableSchema) -> Result<RecordBatch, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<(String, ColumnType)> = rdr
        .headers()?
        .iter()
        .map(|h| {
            let name = h.to_lowercase();
            let column_type = schema
                .column(&name)
                .map_or(ColumnType::Text, |c| c.column_type);
            (name, column_type)
        })
        .collect();

    let mut batch = RecordBatch::new();
    for record in rdr.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|((name, column_type), cell)| (name.clone(), Value::parse_as(cell, *column_type)))
            .collect();
        batch.push(row);
    }

    Ok(batch)
}
