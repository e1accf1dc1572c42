//! Persistence seam for the import pipeline.
//!
//! The coordinator only talks to [`ImportStore`]. [`PgImportStore`] is the
//! production implementation; [`MemoryImportStore`] keeps everything in
//! process and enforces the same lifecycle rules.

mod memory;
mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use soleflip_core::{BatchStatus, SourceType};
use soleflip_db::{BatchCounts, ImportBatchRow, NewImportBatch, NewImportRecord};
use uuid::Uuid;

use crate::error::StoreError;
use crate::transform::CanonicalProduct;

pub use memory::MemoryImportStore;
pub use pg::PgImportStore;

/// A batch as seen by status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSnapshot {
    pub id: Uuid,
    pub source_type: SourceType,
    pub source_descriptor: Value,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub retry_of: Option<Uuid>,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ImportBatchRow> for BatchSnapshot {
    type Error = StoreError;

    fn try_from(row: ImportBatchRow) -> Result<Self, Self::Error> {
        let count = |n: i32| u32::try_from(n).unwrap_or(0);
        Ok(Self {
            status: row
                .status()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            source_type: row
                .source_type()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            id: row.id,
            source_descriptor: row.source_descriptor,
            counts: BatchCounts {
                total: count(row.total_records),
                processed: count(row.processed_records),
                skipped: count(row.skipped_records),
                errors: count(row.error_records),
            },
            last_error: row.last_error,
            retry_count: count(row.retry_count),
            retry_of: row.retry_of,
            dry_run: row.dry_run,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// What persisting one product did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Updated,
    /// Stored data already matched; nothing was written.
    Unchanged,
}

#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Creates a `pending` batch.
    async fn create_batch(&self, batch: &NewImportBatch) -> Result<BatchSnapshot, StoreError>;

    async fn batch(&self, id: Uuid) -> Result<Option<BatchSnapshot>, StoreError>;

    /// Guarded status change; see [`BatchStatus::can_transition_to`].
    async fn transition(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Writes running counters. Rejected once the batch is terminal.
    async fn progress(&self, id: Uuid, counts: BatchCounts) -> Result<(), StoreError>;

    /// Final counters plus a terminal status, atomically.
    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Appends one audit record.
    async fn record(&self, record: &NewImportRecord) -> Result<(), StoreError>;

    /// Inserts the product or merges it into the stored one with the same
    /// stable key. Calls for one key are serialized.
    async fn reconcile(&self, product: &CanonicalProduct) -> Result<ReconcileOutcome, StoreError>;
}
