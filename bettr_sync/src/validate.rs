//! Row validation against a table schema
//!
//! Checks run per row and every failure is collected, so a rejected batch
//! reports all offending rows at once:
//! - every field is a column of the table (unknown fields are dropped instead in lenient mode)
//! - the primary key is present and not null
//! - non-nullable columns are present and not null
//! - values match the declared column type (integers widen to real)

use crate::error::{RowFailure, RowFailureReason, ValidationError};
use crate::schema::TableSchema;
use bettr_common::{RecordBatch, Row};
use std::collections::BTreeSet;

/// How fields that aren't columns of the table are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Unknown fields fail the row
    #[default]
    Strict,
    /// Unknown fields are dropped before checking
    Lenient,
}

/// Outcome of validating rows in skip-invalid mode
#[derive(Debug, Default)]
pub struct Checked {
    /// Rows that passed, normalized, with their index in the incoming batch
    pub accepted: Vec<(usize, Row)>,
    /// Failures of the rows that were left out
    pub rejected: Vec<RowFailure>,
}

/// Batch validator
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    mode: ValidationMode,
    skip_invalid: bool,
}

impl Validator {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            skip_invalid: false,
        }
    }

    /// Leave failing rows out instead of rejecting the whole batch
    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate a batch, returning the normalized rows.
    ///
    /// Row indices in the error are positions in `batch`. In skip-invalid
    /// mode failing rows are left out and logged rather than returned.
    pub fn validate(
        &self,
        batch: RecordBatch,
        schema: &TableSchema,
    ) -> Result<RecordBatch, ValidationError> {
        let checked = self.check(batch.into_rows().into_iter().enumerate(), schema)?;
        for failure in &checked.rejected {
            log::warn!("Skipping invalid row for {}: {}", schema.name(), failure);
        }
        Ok(checked.accepted.into_iter().map(|(_, row)| row).collect())
    }

    /// Validate rows tagged with their original batch index
    pub fn check<I>(&self, rows: I, schema: &TableSchema) -> Result<Checked, ValidationError>
    where
        I: IntoIterator<Item = (usize, Row)>,
    {
        let mut checked = Checked::default();
        let mut dropped_fields = BTreeSet::new();

        for (index, row) in rows {
            let (row, failures) = self.check_row(index, row, schema, &mut dropped_fields);
            if failures.is_empty() {
                checked.accepted.push((index, row));
            } else {
                checked.rejected.extend(failures);
            }
        }

        if !dropped_fields.is_empty() {
            log::warn!(
                "Dropped fields not in {}: {}",
                schema.name(),
                dropped_fields.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        if !checked.rejected.is_empty() && !self.skip_invalid {
            return Err(ValidationError {
                table: schema.name().to_string(),
                failures: checked.rejected,
            });
        }

        Ok(checked)
    }

    fn check_row(
        &self,
        index: usize,
        row: Row,
        schema: &TableSchema,
        dropped_fields: &mut BTreeSet<String>,
    ) -> (Row, Vec<RowFailure>) {
        let mut failures = Vec::new();
        let mut normalized = Row::new();

        for (field, value) in row {
            let Some(column) = schema.column(&field) else {
                match self.mode {
                    ValidationMode::Strict => failures.push(RowFailure {
                        row_index: index,
                        column: field,
                        reason: RowFailureReason::UnknownField,
                    }),
                    ValidationMode::Lenient => {
                        dropped_fields.insert(field);
                    }
                }
                continue;
            };

            match value.conform_to(column.column_type) {
                Some(value) => {
                    normalized.insert(field, value);
                }
                None => failures.push(RowFailure {
                    row_index: index,
                    reason: RowFailureReason::TypeMismatch {
                        expected: column.column_type,
                        found: value.type_name(),
                    },
                    column: field,
                }),
            }
        }

        for column in schema.columns() {
            if column.nullable {
                continue;
            }
            // A present value of the wrong type was already reported above
            let missing = match normalized.get(&column.name) {
                Some(value) => value.is_null(),
                None => !failures.iter().any(|f| f.column == column.name),
            };
            if missing {
                failures.push(RowFailure {
                    row_index: index,
                    column: column.name.clone(),
                    reason: if column.primary_key {
                        RowFailureReason::MissingPrimaryKey
                    } else {
                        RowFailureReason::MissingRequired
                    },
                });
            }
        }

        (normalized, failures)
    }
}
