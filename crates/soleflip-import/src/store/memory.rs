use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use soleflip_core::{BatchStatus, RecordStatus};
use soleflip_db::{BatchCounts, NewImportBatch, NewImportRecord};
use uuid::Uuid;

use super::{BatchSnapshot, ImportStore, ReconcileOutcome};
use crate::error::StoreError;
use crate::identity::{reconcile, Reconciliation};
use crate::transform::CanonicalProduct;

/// In-process [`ImportStore`] for tests and dry runs without a database.
#[derive(Debug, Default)]
pub struct MemoryImportStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    batches: HashMap<Uuid, BatchSnapshot>,
    records: Vec<NewImportRecord>,
    products: HashMap<String, CanonicalProduct>,
}

impl MemoryImportStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // No method panics while holding the lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a product directly, bypassing reconciliation.
    pub fn seed_product(&self, product: CanonicalProduct) {
        self.state()
            .products
            .insert(product.stable_key.as_str().to_owned(), product);
    }

    #[must_use]
    pub fn product(&self, stable_key: &str) -> Option<CanonicalProduct> {
        self.state().products.get(stable_key).cloned()
    }

    #[must_use]
    pub fn product_count(&self) -> usize {
        self.state().products.len()
    }

    /// Audit records of one batch, in position order.
    #[must_use]
    pub fn records(&self, batch_id: Uuid) -> Vec<NewImportRecord> {
        let mut records: Vec<_> = self
            .state()
            .records
            .iter()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.position);
        records
    }

    #[must_use]
    pub fn count_records(&self, batch_id: Uuid, status: RecordStatus) -> usize {
        self.state()
            .records
            .iter()
            .filter(|r| r.batch_id == batch_id && r.status == status)
            .count()
    }
}

fn batch_mut(state: &mut State, id: Uuid) -> Result<&mut BatchSnapshot, StoreError> {
    state.batches.get_mut(&id).ok_or(StoreError::BatchNotFound(id))
}

fn guard(batch: &BatchSnapshot, from: BatchStatus, to: BatchStatus) -> Result<(), StoreError> {
    if batch.status == from && from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: batch.id,
            from,
            to,
        })
    }
}

#[async_trait]
impl ImportStore for MemoryImportStore {
    async fn create_batch(&self, batch: &NewImportBatch) -> Result<BatchSnapshot, StoreError> {
        let now = Utc::now();
        let snapshot = BatchSnapshot {
            id: Uuid::new_v4(),
            source_type: batch.source_type,
            source_descriptor: batch.source_descriptor.clone(),
            status: BatchStatus::Pending,
            counts: BatchCounts::default(),
            last_error: None,
            retry_count: batch.retry_count,
            retry_of: batch.retry_of,
            dry_run: batch.dry_run,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        let mut state = self.state();
        if let Some(previous) = batch.retry_of {
            if !state.batches.contains_key(&previous) {
                return Err(StoreError::BatchNotFound(previous));
            }
        }
        state.batches.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn batch(&self, id: Uuid) -> Result<Option<BatchSnapshot>, StoreError> {
        Ok(self.state().batches.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let batch = batch_mut(&mut state, id)?;
        guard(batch, from, to)?;
        let now = Utc::now();
        batch.status = to;
        if let Some(error) = last_error {
            batch.last_error = Some(error.to_owned());
        }
        if to == BatchStatus::Validating {
            batch.started_at = Some(now);
        }
        if to.is_terminal() {
            batch.completed_at = Some(now);
        }
        batch.updated_at = now;
        Ok(())
    }

    async fn progress(&self, id: Uuid, counts: BatchCounts) -> Result<(), StoreError> {
        let mut state = self.state();
        let batch = batch_mut(&mut state, id)?;
        if batch.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                id,
                from: batch.status,
                to: batch.status,
            });
        }
        batch.counts = counts;
        batch.updated_at = Utc::now();
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let batch = batch_mut(&mut state, id)?;
        if !to.is_terminal() {
            return Err(StoreError::InvalidTransition { id, from, to });
        }
        guard(batch, from, to)?;
        let now = Utc::now();
        batch.status = to;
        batch.counts = counts;
        if let Some(error) = last_error {
            batch.last_error = Some(error.to_owned());
        }
        batch.completed_at = Some(now);
        batch.updated_at = now;
        Ok(())
    }

    async fn record(&self, record: &NewImportRecord) -> Result<(), StoreError> {
        self.state().records.push(record.clone());
        Ok(())
    }

    async fn reconcile(&self, product: &CanonicalProduct) -> Result<ReconcileOutcome, StoreError> {
        let mut state = self.state();
        let key = product.stable_key.as_str();
        match reconcile(state.products.get(key), product) {
            Reconciliation::Insert => {
                state.products.insert(key.to_owned(), product.clone());
                Ok(ReconcileOutcome::Inserted)
            }
            Reconciliation::Update(merged) => {
                state.products.insert(key.to_owned(), merged);
                Ok(ReconcileOutcome::Updated)
            }
            Reconciliation::Unchanged => Ok(ReconcileOutcome::Unchanged),
        }
    }
}
