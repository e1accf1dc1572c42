//! Database operations for `import_batches`.
//!
//! Status changes are guarded updates: the `WHERE status = $expected` clause
//! makes a concurrent or illegal transition affect zero rows, which surfaces
//! as [`DbError::InvalidBatchTransition`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use soleflip_core::{BatchStatus, CoreError, SourceType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{to_i32, DbError};

const BATCH_COLUMNS: &str = "id, source_type, source_descriptor, status, total_records, \
     processed_records, skipped_records, error_records, last_error, retry_count, retry_of, \
     dry_run, created_at, started_at, completed_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `import_batches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportBatchRow {
    pub id: Uuid,
    pub source_type: String,
    pub source_descriptor: Value,
    pub status: String,
    pub total_records: i32,
    /// Successful writes plus skipped duplicates.
    pub processed_records: i32,
    /// The skipped-duplicate share of `processed_records`.
    pub skipped_records: i32,
    pub error_records: i32,
    pub last_error: Option<String>,
    pub retry_count: i32,
    pub retry_of: Option<Uuid>,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ImportBatchRow {
    /// Parses the stored status column.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] if the column holds a value
    /// this build does not know.
    pub fn status(&self) -> Result<BatchStatus, CoreError> {
        self.status.parse()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for an unknown source type.
    pub fn source_type(&self) -> Result<SourceType, CoreError> {
        self.source_type.parse()
    }
}

/// Values for a new batch. The batch always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewImportBatch {
    pub source_type: SourceType,
    pub source_descriptor: Value,
    pub retry_of: Option<Uuid>,
    pub retry_count: u32,
    pub dry_run: bool,
}

/// Counter snapshot written on every progress update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: u32,
    pub processed: u32,
    pub skipped: u32,
    pub errors: u32,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Inserts a new `pending` batch and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a `retry_of`
/// that references no batch).
pub async fn create_import_batch(
    pool: &PgPool,
    batch: &NewImportBatch,
) -> Result<ImportBatchRow, DbError> {
    let row = sqlx::query_as::<_, ImportBatchRow>(&format!(
        "INSERT INTO import_batches \
             (id, source_type, source_descriptor, status, retry_of, retry_count, dry_run) \
         VALUES ($1, $2, $3, 'pending', $4, $5, $6) \
         RETURNING {BATCH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(batch.source_type.as_str())
    .bind(&batch.source_descriptor)
    .bind(batch.retry_of)
    .bind(to_i32(batch.retry_count))
    .bind(batch.dry_run)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no batch has this id, or
/// [`DbError::Sqlx`] on query failure.
pub async fn get_import_batch(pool: &PgPool, id: Uuid) -> Result<ImportBatchRow, DbError> {
    sqlx::query_as::<_, ImportBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM import_batches WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Most recent batches first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_import_batches(pool: &PgPool, limit: i64) -> Result<Vec<ImportBatchRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM import_batches ORDER BY created_at DESC LIMIT $1"
    ))
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Non-terminal batches whose `updated_at` is older than `idle_secs`.
///
/// The coordinator never fails a batch for being slow; this is what an
/// operator or monitor polls instead.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_stalled_import_batches(
    pool: &PgPool,
    idle_secs: u32,
) -> Result<Vec<ImportBatchRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM import_batches \
         WHERE status IN ('pending', 'validating', 'processing') \
           AND updated_at < NOW() - make_interval(secs => $1) \
         ORDER BY updated_at ASC"
    ))
    .bind(f64::from(idle_secs))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Moves a batch from `from` to `to`.
///
/// Entering `validating` stamps `started_at`; entering a terminal status
/// stamps `completed_at`. `last_error` replaces the stored summary when
/// given.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchTransition`] when the lifecycle forbids
/// the move or the stored status is no longer `from`.
pub async fn transition_import_batch(
    pool: &PgPool,
    id: Uuid,
    from: BatchStatus,
    to: BatchStatus,
    last_error: Option<&str>,
) -> Result<(), DbError> {
    let invalid = || DbError::InvalidBatchTransition {
        id,
        from: from.as_str().to_owned(),
        to: to.as_str().to_owned(),
    };
    if !from.can_transition_to(to) {
        return Err(invalid());
    }

    let result = sqlx::query(
        "UPDATE import_batches \
         SET status = $1, \
             last_error = COALESCE($2, last_error), \
             started_at = CASE WHEN $1 = 'validating' THEN NOW() ELSE started_at END, \
             completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END, \
             updated_at = NOW() \
         WHERE id = $3 AND status = $5",
    )
    .bind(to.as_str())
    .bind(last_error)
    .bind(id)
    .bind(to.is_terminal())
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(invalid());
    }

    Ok(())
}

/// Writes the running counters and bumps `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::BatchFinished`] if the batch is already terminal or
/// does not exist.
pub async fn update_import_batch_progress(
    pool: &PgPool,
    id: Uuid,
    counts: BatchCounts,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE import_batches \
         SET total_records = $1, processed_records = $2, skipped_records = $3, \
             error_records = $4, updated_at = NOW() \
         WHERE id = $5 AND status IN ('pending', 'validating', 'processing')",
    )
    .bind(to_i32(counts.total))
    .bind(to_i32(counts.processed))
    .bind(to_i32(counts.skipped))
    .bind(to_i32(counts.errors))
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::BatchFinished { id });
    }

    Ok(())
}

/// Final counters and terminal status in one statement, so a finished
/// batch is never observed with stale counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchTransition`] if `to` is not terminal, the
/// move is not allowed, or the stored status is no longer `from`.
pub async fn finish_import_batch(
    pool: &PgPool,
    id: Uuid,
    from: BatchStatus,
    to: BatchStatus,
    counts: BatchCounts,
    last_error: Option<&str>,
) -> Result<(), DbError> {
    let invalid = || DbError::InvalidBatchTransition {
        id,
        from: from.as_str().to_owned(),
        to: to.as_str().to_owned(),
    };
    if !to.is_terminal() || !from.can_transition_to(to) {
        return Err(invalid());
    }

    let result = sqlx::query(
        "UPDATE import_batches \
         SET status = $1, total_records = $2, processed_records = $3, \
             skipped_records = $4, error_records = $5, \
             last_error = COALESCE($6, last_error), \
             completed_at = NOW(), updated_at = NOW() \
         WHERE id = $7 AND status = $8",
    )
    .bind(to.as_str())
    .bind(to_i32(counts.total))
    .bind(to_i32(counts.processed))
    .bind(to_i32(counts.skipped))
    .bind(to_i32(counts.errors))
    .bind(last_error)
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(invalid());
    }

    Ok(())
}
