//! Appending validated batches to a storage backend

use crate::error::PersistError;
use crate::pipeline::SyncResult;
use crate::schema::TableSchema;
use crate::store::StorageBackend;
use bettr_common::RecordBatch;
use std::time::Duration;

/// How transient backend failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first transient failure
    pub retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Writes whole batches; a batch is stored completely or not at all
pub struct Persister<'a, B: ?Sized> {
    backend: &'a B,
    retry: RetryPolicy,
}

impl<'a, B: StorageBackend + ?Sized> Persister<'a, B> {
    pub fn new(backend: &'a B, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Append a batch in one write.
    ///
    /// Transient failures retry the whole batch; anything else surfaces
    /// immediately. The returned result only carries the inserted count.
    pub fn append(&self, batch: &RecordBatch, schema: &TableSchema) -> Result<SyncResult, PersistError> {
        let mut attempt = 0;
        loop {
            match self.backend.append_rows(schema, batch.rows()) {
                Ok(inserted) => {
                    return Ok(SyncResult {
                        inserted_count: inserted,
                        ..SyncResult::default()
                    })
                }
                Err(e) if e.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    log::warn!(
                        "Transient failure writing {} rows to {}, retrying ({}/{}): {}",
                        batch.len(),
                        schema.name(),
                        attempt,
                        self.retry.retries,
                        e.message
                    );
                    if !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistErrorKind;
    use crate::schema::{ColumnDef, ModelDescriptor};
    use crate::store::MemoryStore;
    use bettr_common::{row, ColumnType};

    fn schema() -> TableSchema {
        TableSchema::from_model(
            &ModelDescriptor::new("Team")
                .column(ColumnDef::new("team_id", ColumnType::Integer).primary_key()),
        )
        .unwrap()
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy {
            retries: 1,
            backoff: Duration::ZERO,
        }
    }

    fn batch() -> RecordBatch {
        RecordBatch::from_rows(vec![row([("team_id", 1i64)]), row([("team_id", 2i64)])])
    }

    #[test]
    fn append_reports_inserted_count() {
        let store = MemoryStore::new();
        let result = Persister::new(&store, no_wait()).append(&batch(), &schema()).unwrap();
        assert_eq!(result.inserted_count, 2);
        assert_eq!(result.skipped_count, 0);
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let store = MemoryStore::new();
        store.fail_next_append(PersistErrorKind::Transient);
        let result = Persister::new(&store, no_wait()).append(&batch(), &schema()).unwrap();
        assert_eq!(result.inserted_count, 2);
        assert_eq!(store.append_calls(), 2);
        assert_eq!(store.row_count("team"), 2);
    }

    #[test]
    fn second_transient_failure_surfaces() {
        let store = MemoryStore::new();
        store.fail_next_append(PersistErrorKind::Transient);
        store.fail_next_append(PersistErrorKind::Transient);
        let err = Persister::new(&store, no_wait()).append(&batch(), &schema()).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.append_calls(), 2);
        assert_eq!(store.row_count("team"), 0);
    }

    #[test]
    fn schema_mismatch_is_not_retried() {
        let store = MemoryStore::new();
        store.fail_next_append(PersistErrorKind::SchemaMismatch);
        let err = Persister::new(&store, no_wait()).append(&batch(), &schema()).unwrap_err();
        assert_eq!(err.kind, PersistErrorKind::SchemaMismatch);
        assert_eq!(store.append_calls(), 1);
    }
}
