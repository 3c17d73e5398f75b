//! Primary-key deduplication of incoming batches
//!
//! A left anti-join on the primary key: a row is kept iff its key is not
//! already persisted and no earlier row of the same batch carries it. Other
//! fields are never compared, so a known key with changed values is still a
//! duplicate (append-only, never update).

use crate::schema::TableSchema;
use bettr_common::{ExistingKeySet, RecordBatch};
use std::collections::HashSet;

/// Indices of the rows of `batch` that are new, in input order.
///
/// Rows without a usable key are kept so that validation can report them.
pub fn retain_new(batch: &RecordBatch, schema: &TableSchema, existing: &ExistingKeySet) -> Vec<usize> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .enumerate()
        .filter(|(_, row)| match schema.key_of(row) {
            Some(key) => !existing.contains(&key) && seen.insert(key),
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}

/// The new-only subset of `batch`, preserving relative order
pub fn diff(batch: RecordBatch, schema: &TableSchema, existing: &ExistingKeySet) -> RecordBatch {
    let keep: HashSet<usize> = retain_new(&batch, schema, existing).into_iter().collect();
    batch
        .into_rows()
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, row)| row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ModelDescriptor};
    use bettr_common::{row, ColumnType, Key, Row, Value};

    fn schema() -> TableSchema {
        TableSchema::from_model(
            &ModelDescriptor::new("TeamGameLog")
                .column(ColumnDef::new("game_id", ColumnType::Text).primary_key())
                .column(ColumnDef::new("team_id", ColumnType::Integer))
                .column(ColumnDef::new("points", ColumnType::Integer)),
        )
        .unwrap()
    }

    fn game(id: &str, points: i64) -> Row {
        row([("game_id", Value::from(id)), ("points", Value::from(points))])
    }

    fn keys(ids: &[&str]) -> ExistingKeySet {
        ids.iter().map(|id| Key::from(*id)).collect()
    }

    fn ids(batch: &RecordBatch) -> Vec<String> {
        batch.iter().map(|r| r["game_id"].to_string()).collect()
    }

    #[test]
    fn drops_persisted_keys_and_in_batch_repeats() {
        let batch = RecordBatch::from_rows(vec![game("G1", 100), game("G3", 101), game("G3", 102)]);
        let out = diff(batch, &schema(), &keys(&["G1", "G2"]));
        assert_eq!(ids(&out), vec!["G3"]);
        // first occurrence wins
        assert_eq!(out.rows()[0]["points"], Value::Int(101));
    }

    #[test]
    fn same_key_with_different_values_is_a_duplicate() {
        let batch = RecordBatch::from_rows(vec![game("G1", 999)]);
        assert!(diff(batch, &schema(), &keys(&["G1"])).is_empty());
    }

    #[test]
    fn preserves_input_order() {
        let batch = RecordBatch::from_rows(vec![
            game("G5", 1),
            game("G2", 2),
            game("G4", 3),
            game("G1", 4),
            game("G2", 5),
        ]);
        let out = diff(batch, &schema(), &keys(&["G4"]));
        assert_eq!(ids(&out), vec!["G5", "G2", "G1"]);
    }

    #[test]
    fn retain_new_reports_original_indices() {
        let batch = RecordBatch::from_rows(vec![game("G1", 1), game("G3", 2), game("G3", 3), game("G4", 4)]);
        assert_eq!(retain_new(&batch, &schema(), &keys(&["G1"])), vec![1, 3]);
    }

    #[test]
    fn rows_without_key_are_kept_for_validation() {
        let batch = RecordBatch::from_rows(vec![
            row([("points", Value::from(1i64))]),
            row([("game_id", Value::Null)]),
            game("G1", 2),
        ]);
        assert_eq!(retain_new(&batch, &schema(), &keys(&["G1"])), vec![0, 1]);
    }

    #[test]
    fn empty_existing_set_keeps_first_of_each_key() {
        let batch = RecordBatch::from_rows(vec![game("A", 1), game("B", 2), game("A", 3)]);
        assert_eq!(retain_new(&batch, &schema(), &ExistingKeySet::new()), vec![0, 1]);
    }

    #[test]
    fn every_row_known_gives_empty_diff() {
        let batch = RecordBatch::from_rows(vec![game("G1", 1), game("G2", 2)]);
        assert!(retain_new(&batch, &schema(), &keys(&["G1", "G2"])).is_empty());
    }
}
