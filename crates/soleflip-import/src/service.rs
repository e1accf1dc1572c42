//! Batch submission, status and cancellation.
//!
//! [`ImportService`] hands out a batch id as soon as the batch row exists
//! and runs the batch in the background. At most
//! `max_concurrent_batches` run at once; later submissions wait, still
//! `pending`, for a slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use soleflip_core::{AppConfig, BatchStatus};
use soleflip_db::NewImportBatch;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::coordinator::{BatchSummary, CoordinatorSettings, ImportCoordinator};
use crate::error::{ImportError, StoreError};
use crate::source::{OrderSource, SourceDescriptor};
use crate::store::{BatchSnapshot, ImportStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub max_concurrent_batches: usize,
    pub coordinator: CoordinatorSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 2,
            coordinator: CoordinatorSettings::default(),
        }
    }
}

impl ServiceSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_batches: config.import_max_concurrent_batches,
            coordinator: CoordinatorSettings::from_app_config(config),
        }
    }
}

/// Options for a new batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Validate and transform only; no products are written.
    pub dry_run: bool,
    /// The failed or partially failed batch this one retries.
    pub retry_of: Option<Uuid>,
}

#[derive(Clone)]
pub struct ImportService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ImportStore>,
    coordinator: ImportCoordinator,
    slots: Semaphore,
    tracker: TaskTracker,
    running: Mutex<HashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
}

impl ImportService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ImportStore>,
        orders: Option<Arc<dyn OrderSource>>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator: ImportCoordinator::new(Arc::clone(&store), orders, settings.coordinator),
                store,
                slots: Semaphore::new(settings.max_concurrent_batches.max(1)),
                tracker: TaskTracker::new(),
                running: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Creates the batch and starts it in the background.
    ///
    /// # Errors
    ///
    /// - [`ImportError::ShuttingDown`] after [`Self::shutdown`].
    /// - [`ImportError::NotRetryable`] if `retry_of` names a batch that is
    ///   not failed or partially failed.
    /// - [`ImportError::Store`] if the batch cannot be created.
    pub async fn submit(
        &self,
        descriptor: SourceDescriptor,
        options: SubmitOptions,
    ) -> Result<Uuid, ImportError> {
        let (batch, cancel) = self.prepare(&descriptor, options).await?;
        let id = batch.id;
        let service = self.clone();
        self.inner.tracker.spawn(async move {
            if let Err(err) = service.execute(&batch, &descriptor, &cancel).await {
                tracing::error!(batch_id = %batch.id, error = %err, "import batch errored");
            }
        });
        Ok(id)
    }

    /// Creates the batch and runs it to completion on the current task.
    ///
    /// # Errors
    ///
    /// As [`Self::submit`], plus store failures during the run.
    pub async fn run(
        &self,
        descriptor: SourceDescriptor,
        options: SubmitOptions,
    ) -> Result<BatchSummary, ImportError> {
        let (batch, cancel) = self.prepare(&descriptor, options).await?;
        self.execute(&batch, &descriptor, &cancel).await
    }

    /// Re-submits the source of a failed or partially failed batch as a new
    /// batch. The old batch is left untouched.
    ///
    /// # Errors
    ///
    /// [`ImportError::Descriptor`] if the stored source no longer parses,
    /// otherwise as [`Self::submit`].
    pub async fn retry(&self, batch_id: Uuid, dry_run: bool) -> Result<Uuid, ImportError> {
        let previous = self.existing(batch_id).await?;
        let descriptor = SourceDescriptor::from_json(&previous.source_descriptor)?;
        self.submit(
            descriptor,
            SubmitOptions {
                dry_run,
                retry_of: Some(batch_id),
            },
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`ImportError::Store`] on store failure.
    pub async fn status(&self, batch_id: Uuid) -> Result<Option<BatchSnapshot>, ImportError> {
        Ok(self.inner.store.batch(batch_id).await?)
    }

    /// Requests cancellation of a queued or running batch. Returns `false`
    /// if the batch is not active in this process.
    pub fn cancel(&self, batch_id: Uuid) -> bool {
        let running = self.inner.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.get(&batch_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(batch_id = %batch_id, "import batch cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancels every batch this process is running or holding in queue.
    pub fn cancel_all(&self) {
        self.inner.shutdown.cancel();
    }

    /// Stops accepting batches and waits for the ones already submitted.
    pub async fn shutdown(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!("import service drained");
    }

    async fn existing(&self, batch_id: Uuid) -> Result<BatchSnapshot, ImportError> {
        self.inner
            .store
            .batch(batch_id)
            .await?
            .ok_or_else(|| StoreError::BatchNotFound(batch_id).into())
    }

    async fn prepare(
        &self,
        descriptor: &SourceDescriptor,
        options: SubmitOptions,
    ) -> Result<(BatchSnapshot, CancellationToken), ImportError> {
        if self.inner.tracker.is_closed() {
            return Err(ImportError::ShuttingDown);
        }

        let retry_count = match options.retry_of {
            Some(previous_id) => {
                let previous = self.existing(previous_id).await?;
                if !previous.status.is_retryable() {
                    return Err(ImportError::NotRetryable {
                        id: previous_id,
                        status: previous.status,
                    });
                }
                previous.retry_count.saturating_add(1)
            }
            None => 0,
        };

        let batch = self
            .inner
            .store
            .create_batch(&NewImportBatch {
                source_type: descriptor.source_type(),
                source_descriptor: descriptor.to_json()?,
                retry_of: options.retry_of,
                retry_count,
                dry_run: options.dry_run,
            })
            .await?;

        let cancel = self.inner.shutdown.child_token();
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(batch.id, cancel.clone());
        tracing::info!(batch_id = %batch.id, retry_of = ?options.retry_of, "import batch created");
        Ok((batch, cancel))
    }

    async fn execute(
        &self,
        batch: &BatchSnapshot,
        descriptor: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, ImportError> {
        let result = self.execute_in_slot(batch, descriptor, cancel).await;
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&batch.id);
        result
    }

    async fn execute_in_slot(
        &self,
        batch: &BatchSnapshot,
        descriptor: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, ImportError> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            permit = self.inner.slots.acquire() => permit.ok(),
        };
        let Some(_permit) = permit else {
            let reason = "cancelled before start";
            self.inner
                .store
                .finish(
                    batch.id,
                    BatchStatus::Pending,
                    BatchStatus::Failed,
                    batch.counts,
                    Some(reason),
                )
                .await?;
            return Ok(BatchSummary {
                batch_id: batch.id,
                status: BatchStatus::Failed,
                counts: batch.counts,
                last_error: Some(reason.to_owned()),
            });
        };

        self.inner.coordinator.run(batch, descriptor, cancel).await
    }
}
