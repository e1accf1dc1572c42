//! Database operations for `import_records`, the per-record audit trail.
//!
//! Records are written once, already carrying their final status.

use chrono::{DateTime, Utc};
use serde_json::Value;
use soleflip_core::RecordStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `import_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportRecordRow {
    pub id: i64,
    pub batch_id: Uuid,
    /// Zero-based position of the record in its source.
    pub position: i32,
    pub raw_payload: Value,
    pub canonical_payload: Option<Value>,
    pub stable_key: Option<String>,
    pub status: String,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImportRecord {
    pub batch_id: Uuid,
    pub position: u32,
    pub raw_payload: Value,
    pub canonical_payload: Option<Value>,
    pub stable_key: Option<String>,
    pub status: RecordStatus,
    pub error_detail: Option<String>,
}

/// Inserts one audit record and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including a second
/// record at the same batch position.
pub async fn insert_import_record(pool: &PgPool, record: &NewImportRecord) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO import_records \
             (batch_id, position, raw_payload, canonical_payload, stable_key, status, error_detail) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(record.batch_id)
    .bind(crate::to_i32(record.position))
    .bind(&record.raw_payload)
    .bind(record.canonical_payload.as_ref())
    .bind(record.stable_key.as_deref())
    .bind(record.status.as_str())
    .bind(record.error_detail.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Records of a batch in source order, optionally filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_import_records(
    pool: &PgPool,
    batch_id: Uuid,
    status: Option<RecordStatus>,
    limit: i64,
) -> Result<Vec<ImportRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportRecordRow>(
        "SELECT id, batch_id, position, raw_payload, canonical_payload, stable_key, \
                status, error_detail, created_at \
         FROM import_records \
         WHERE batch_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY position \
         LIMIT $3",
    )
    .bind(batch_id)
    .bind(status.map(RecordStatus::as_str))
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `(status, count)` pairs for one batch, ordered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn count_import_records_by_status(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<(String, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM import_records \
         WHERE batch_id = $1 GROUP BY status ORDER BY status",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
