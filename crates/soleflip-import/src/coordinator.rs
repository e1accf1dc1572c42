//! Runs one batch: load, validate, transform, persist, count.
//!
//! ```text
//! pending --load--> validating --first valid record--> processing --> terminal
//! ```
//!
//! Records are handled one at a time in source order. A rejected record is
//! audited and counted, never fatal. The batch fails as a whole only when
//! the source cannot be read, the error rate crosses the abort threshold,
//! every record is rejected, it is cancelled, or the store itself fails.
//! Records an aborted or cancelled run never reaches are audited as
//! `invalid` and counted as errors.

use std::sync::Arc;

use soleflip_core::{AppConfig, BatchStatus, RecordStatus};
use soleflip_db::{BatchCounts, NewImportRecord};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ImportError;
use crate::parse::RawRecord;
use crate::source::{OrderSource, SourceDescriptor};
use crate::store::{BatchSnapshot, ImportStore, ReconcileOutcome};
use crate::transform::transform;
use crate::validate::{validator_for, RecordValidator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorSettings {
    /// Fraction of rejected records (0.0..=1.0) above which the batch is
    /// aborted.
    pub abort_error_rate: f64,
    /// Records that must have been seen before the rate is evaluated.
    pub abort_min_records: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            abort_error_rate: 0.5,
            abort_min_records: 20,
        }
    }
}

impl CoordinatorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            abort_error_rate: config.import_abort_error_rate,
            abort_min_records: config.import_abort_min_records,
        }
    }

    fn should_abort(&self, counts: BatchCounts) -> bool {
        let seen = counts.processed + counts.errors;
        seen >= self.abort_min_records.max(1)
            && f64::from(counts.errors) / f64::from(seen) > self.abort_error_rate
    }
}

/// Final state of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub counts: BatchCounts,
    pub last_error: Option<String>,
}

enum RecordOutcome {
    Written,
    Duplicate,
    Rejected(String),
}

pub struct ImportCoordinator {
    store: Arc<dyn ImportStore>,
    orders: Option<Arc<dyn OrderSource>>,
    settings: CoordinatorSettings,
}

impl ImportCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn ImportStore>,
        orders: Option<Arc<dyn OrderSource>>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            orders,
            settings,
        }
    }

    /// Drives a `pending` batch to a terminal status.
    ///
    /// Ordinary failures (unreadable source, abort, cancellation) end in a
    /// `failed` batch and an `Ok` summary.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Store`] when the store rejects a write; the
    /// batch is then marked `failed` on a best-effort basis.
    pub async fn run(
        &self,
        batch: &BatchSnapshot,
        descriptor: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, ImportError> {
        let mut stage = BatchStatus::Pending;
        match self.drive(batch, descriptor, cancel, &mut stage).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                let reason = format!("import aborted: {err}");
                if let Err(fail_err) = self
                    .store
                    .transition(batch.id, stage, BatchStatus::Failed, Some(&reason))
                    .await
                {
                    tracing::error!(
                        batch_id = %batch.id,
                        error = %fail_err,
                        "could not mark batch failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        batch: &BatchSnapshot,
        descriptor: &SourceDescriptor,
        cancel: &CancellationToken,
        stage: &mut BatchStatus,
    ) -> Result<BatchSummary, ImportError> {
        let id = batch.id;
        tracing::info!(
            batch_id = %id,
            source_type = %descriptor.source_type(),
            schema = %descriptor.schema(),
            dry_run = batch.dry_run,
            "import batch started"
        );

        let loaded = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            loaded = descriptor.load(self.orders.as_deref()) => Some(loaded),
        };
        let records = match loaded {
            None => {
                return self
                    .fail(id, *stage, BatchCounts::default(), "cancelled while loading the source")
                    .await;
            }
            Some(Err(err)) => {
                let reason = match &err {
                    ImportError::Marketplace(e) if e.is_authentication() => {
                        format!("authentication failed before any record: {e}")
                    }
                    other => format!("source unreadable: {other}"),
                };
                return self.fail(id, *stage, BatchCounts::default(), &reason).await;
            }
            Some(Ok(records)) => records,
        };

        self.store
            .transition(id, BatchStatus::Pending, BatchStatus::Validating, None)
            .await?;
        *stage = BatchStatus::Validating;

        let mut counts = BatchCounts {
            total: u32::try_from(records.len()).unwrap_or(u32::MAX),
            ..BatchCounts::default()
        };
        if counts.total == 0 {
            return self
                .finish(id, *stage, BatchStatus::Completed, counts, None)
                .await;
        }
        self.store.progress(id, counts).await?;

        let validator = validator_for(descriptor.schema());
        let mut last_rejection = None;
        let mut pending = records.into_iter().zip(0_u32..);

        while let Some((raw, position)) = pending.next() {
            if cancel.is_cancelled() {
                let reason = format!("cancelled after {position} of {} records", counts.total);
                let unvisited = std::iter::once((raw, position)).chain(pending);
                self.abandon(id, unvisited, "batch cancelled", &mut counts)
                    .await?;
                return self.fail(id, *stage, counts, &reason).await;
            }

            match self
                .process_record(batch, position, raw, validator, stage)
                .await?
            {
                RecordOutcome::Written => counts.processed += 1,
                RecordOutcome::Duplicate => {
                    counts.processed += 1;
                    counts.skipped += 1;
                }
                RecordOutcome::Rejected(detail) => {
                    counts.errors += 1;
                    last_rejection = Some(format!("record {position}: {detail}"));
                }
            }
            self.store.progress(id, counts).await?;

            if self.settings.should_abort(counts) {
                let seen = counts.processed + counts.errors;
                let reason = format!(
                    "aborted: {} of {seen} records rejected, above the {:.0}% threshold",
                    counts.errors,
                    self.settings.abort_error_rate * 100.0
                );
                tracing::warn!(batch_id = %id, errors = counts.errors, seen, "error rate over threshold");
                self.abandon(id, pending, "batch aborted", &mut counts)
                    .await?;
                return self.fail(id, *stage, counts, &reason).await;
            }
        }

        debug_assert_eq!(counts.total, counts.processed + counts.errors);
        let (status, last_error) = if counts.errors == 0 {
            (BatchStatus::Completed, None)
        } else {
            let summary = format!(
                "{} of {} records rejected; last {}",
                counts.errors,
                counts.total,
                last_rejection.unwrap_or_default()
            );
            let status = if counts.errors == counts.total {
                BatchStatus::Failed
            } else {
                BatchStatus::PartialFailure
            };
            (status, Some(summary))
        };
        self.finish(id, *stage, status, counts, last_error.as_deref())
            .await
    }

    /// Audits every record the run will not reach as `invalid` and counts it
    /// as an error, so `total == processed + errors` holds at the end.
    async fn abandon(
        &self,
        id: Uuid,
        unvisited: impl Iterator<Item = (RawRecord, u32)>,
        cause: &str,
        counts: &mut BatchCounts,
    ) -> Result<(), ImportError> {
        let detail = format!("not processed: {cause}");
        for (raw, position) in unvisited {
            self.store
                .record(&NewImportRecord {
                    batch_id: id,
                    position,
                    raw_payload: raw.into(),
                    canonical_payload: None,
                    stable_key: None,
                    status: RecordStatus::Invalid,
                    error_detail: Some(detail.clone()),
                })
                .await?;
            counts.errors += 1;
        }
        Ok(())
    }

    async fn process_record(
        &self,
        batch: &BatchSnapshot,
        position: u32,
        raw: RawRecord,
        validator: &dyn RecordValidator,
        stage: &mut BatchStatus,
    ) -> Result<RecordOutcome, ImportError> {
        let validated = match validator.validate(&raw) {
            Ok(validated) => validated,
            Err(err) => {
                let detail = err.to_string();
                tracing::debug!(batch_id = %batch.id, position, error = %detail, "record rejected");
                self.store
                    .record(&NewImportRecord {
                        batch_id: batch.id,
                        position,
                        raw_payload: raw.into(),
                        canonical_payload: None,
                        stable_key: None,
                        status: RecordStatus::Invalid,
                        error_detail: Some(detail.clone()),
                    })
                    .await?;
                return Ok(RecordOutcome::Rejected(detail));
            }
        };

        if *stage == BatchStatus::Validating {
            self.store
                .transition(batch.id, BatchStatus::Validating, BatchStatus::Processing, None)
                .await?;
            *stage = BatchStatus::Processing;
        }

        let canonical = transform(validated);
        let (status, outcome) = if batch.dry_run {
            (RecordStatus::Valid, RecordOutcome::Written)
        } else {
            match self.store.reconcile(&canonical.product).await? {
                ReconcileOutcome::Inserted | ReconcileOutcome::Updated => {
                    (RecordStatus::Persisted, RecordOutcome::Written)
                }
                ReconcileOutcome::Unchanged => {
                    (RecordStatus::SkippedDuplicate, RecordOutcome::Duplicate)
                }
            }
        };

        self.store
            .record(&NewImportRecord {
                batch_id: batch.id,
                position,
                raw_payload: raw.into(),
                canonical_payload: Some(canonical.payload()),
                stable_key: Some(canonical.product.stable_key.as_str().to_owned()),
                status,
                error_detail: None,
            })
            .await?;
        Ok(outcome)
    }

    async fn fail(
        &self,
        id: Uuid,
        from: BatchStatus,
        counts: BatchCounts,
        reason: &str,
    ) -> Result<BatchSummary, ImportError> {
        tracing::warn!(batch_id = %id, reason, "import batch failed");
        self.finish(id, from, BatchStatus::Failed, counts, Some(reason))
            .await
    }

    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<BatchSummary, ImportError> {
        self.store.finish(id, from, to, counts, last_error).await?;
        tracing::info!(
            batch_id = %id,
            status = %to,
            total = counts.total,
            processed = counts.processed,
            skipped = counts.skipped,
            errors = counts.errors,
            "import batch finished"
        );
        Ok(BatchSummary {
            batch_id: id,
            status: to,
            counts,
            last_error: last_error.map(str::to_owned),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(processed: u32, errors: u32) -> BatchCounts {
        BatchCounts {
            total: 100,
            processed,
            skipped: 0,
            errors,
        }
    }

    #[test]
    fn abort_waits_for_minimum_sample() {
        let settings = CoordinatorSettings {
            abort_error_rate: 0.5,
            abort_min_records: 10,
        };
        assert!(!settings.should_abort(counts(0, 9)));
        assert!(settings.should_abort(counts(0, 10)));
    }

    #[test]
    fn abort_needs_rate_strictly_above_threshold() {
        let settings = CoordinatorSettings {
            abort_error_rate: 0.5,
            abort_min_records: 4,
        };
        assert!(!settings.should_abort(counts(5, 5)));
        assert!(settings.should_abort(counts(4, 6)));
    }

    #[test]
    fn zero_minimum_still_needs_one_record() {
        let settings = CoordinatorSettings {
            abort_error_rate: 0.0,
            abort_min_records: 0,
        };
        assert!(!settings.should_abort(counts(0, 0)));
        assert!(settings.should_abort(counts(0, 1)));
    }
}
