use async_trait::async_trait;
use soleflip_core::BatchStatus;
use soleflip_db::{BatchCounts, DbError, NewImportBatch, NewImportRecord, ProductWriteOutcome};
use sqlx::PgPool;
use uuid::Uuid;

use super::{BatchSnapshot, ImportStore, ReconcileOutcome};
use crate::error::StoreError;
use crate::identity::{reconcile, Reconciliation};
use crate::transform::CanonicalProduct;

/// [`ImportStore`] backed by the `soleflip-db` tables.
#[derive(Debug, Clone)]
pub struct PgImportStore {
    pool: PgPool,
}

impl PgImportStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transition_error(err: DbError, from: BatchStatus, to: BatchStatus) -> StoreError {
    match err {
        DbError::InvalidBatchTransition { id, .. } | DbError::BatchFinished { id } => {
            StoreError::InvalidTransition { id, from, to }
        }
        DbError::NotFound => StoreError::Corrupt("batch vanished during import".to_owned()),
        other => StoreError::Db(other),
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    async fn create_batch(&self, batch: &NewImportBatch) -> Result<BatchSnapshot, StoreError> {
        let row = soleflip_db::create_import_batch(&self.pool, batch).await?;
        row.try_into()
    }

    async fn batch(&self, id: Uuid) -> Result<Option<BatchSnapshot>, StoreError> {
        match soleflip_db::get_import_batch(&self.pool, id).await {
            Ok(row) => Ok(Some(row.try_into()?)),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        soleflip_db::transition_import_batch(&self.pool, id, from, to, last_error)
            .await
            .map_err(|e| transition_error(e, from, to))
    }

    async fn progress(&self, id: Uuid, counts: BatchCounts) -> Result<(), StoreError> {
        soleflip_db::update_import_batch_progress(&self.pool, id, counts)
            .await
            .map_err(|e| match e {
                DbError::BatchFinished { id } => StoreError::InvalidTransition {
                    id,
                    from: BatchStatus::Processing,
                    to: BatchStatus::Processing,
                },
                other => StoreError::Db(other),
            })
    }

    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        soleflip_db::finish_import_batch(&self.pool, id, from, to, counts, last_error)
            .await
            .map_err(|e| transition_error(e, from, to))
    }

    async fn record(&self, record: &NewImportRecord) -> Result<(), StoreError> {
        soleflip_db::insert_import_record(&self.pool, record).await?;
        Ok(())
    }

    async fn reconcile(&self, product: &CanonicalProduct) -> Result<ReconcileOutcome, StoreError> {
        let write = product.to_write();
        let outcome = soleflip_db::reconcile_product(&self.pool, &write, |row| {
            match CanonicalProduct::from_row(row) {
                Ok(existing) => match reconcile(Some(&existing), product) {
                    Reconciliation::Update(merged) => Some(merged.to_write()),
                    Reconciliation::Insert | Reconciliation::Unchanged => None,
                },
                Err(e) => {
                    tracing::warn!(
                        stable_key = %row.stable_key,
                        error = %e,
                        "stored product unreadable; replacing it"
                    );
                    Some(write.clone())
                }
            }
        })
        .await?;

        Ok(match outcome {
            ProductWriteOutcome::Inserted(_) => ReconcileOutcome::Inserted,
            ProductWriteOutcome::Updated(_) => ReconcileOutcome::Updated,
            ProductWriteOutcome::Unchanged(_) => ReconcileOutcome::Unchanged,
        })
    }
}
