//! End-to-end batch runs against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use soleflip_core::{BatchStatus, RecordSchema, RecordStatus};
use soleflip_db::{BatchCounts, NewImportBatch, NewImportRecord};
use soleflip_import::{
    BatchSnapshot, CanonicalProduct, CoordinatorSettings, ImportCoordinator, ImportService,
    ImportStore, MemoryImportStore, RawRecord, ReconcileOutcome, ServiceSettings,
    SourceDescriptor, StoreError, SubmitOptions,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn object(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn sale(n: usize) -> Value {
    json!({
        "SKU": format!("SF-{n:04}"),
        "Product Name": format!("Runner Model {n}"),
        "Sale Date": "14.03.2025",
        "Status": "Sold",
        "Net Buy": "80,00",
        "Net Sale": "120,00"
    })
}

fn broken_sale(n: usize) -> Value {
    json!({ "Product Name": format!("Unlabelled {n}"), "Status": "Sold" })
}

fn manual(records: Vec<Value>) -> SourceDescriptor {
    SourceDescriptor::Manual {
        label: "sales sheet".to_owned(),
        schema: RecordSchema::ManualSales,
        records: records.into_iter().map(object).collect(),
    }
}

fn service(store: &Arc<MemoryImportStore>) -> ImportService {
    ImportService::new(store.clone(), None, ServiceSettings::default())
}

async fn run(store: &Arc<MemoryImportStore>, descriptor: SourceDescriptor) -> BatchSnapshot {
    let summary = service(store)
        .run(descriptor, SubmitOptions::default())
        .await
        .unwrap();
    store.batch(summary.batch_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn known_style_codes_are_skipped_as_duplicates() {
    let store = Arc::new(MemoryImportStore::new());
    let seeded = run(&store, manual((1..=5).map(sale).collect())).await;
    assert_eq!(seeded.status, BatchStatus::Completed);
    assert_eq!(store.product_count(), 5);

    let batch = run(&store, manual((1..=100).map(sale).collect())).await;

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(
        batch.counts,
        BatchCounts {
            total: 100,
            processed: 100,
            skipped: 5,
            errors: 0,
        }
    );
    assert_eq!(store.product_count(), 100);
    assert_eq!(store.count_records(batch.id, RecordStatus::Persisted), 95);
    assert_eq!(store.count_records(batch.id, RecordStatus::SkippedDuplicate), 5);
    assert!(batch.last_error.is_none());
    assert!(batch.started_at.is_some());
    assert!(batch.completed_at.is_some());
}

#[tokio::test]
async fn invalid_records_are_counted_and_audited() {
    let store = Arc::new(MemoryImportStore::new());
    let mut records: Vec<Value> = (0..7).map(sale).collect();
    records.insert(2, broken_sale(1));
    records.insert(5, broken_sale(2));
    records.push(broken_sale(3));

    let batch = run(&store, manual(records)).await;

    assert_eq!(batch.status, BatchStatus::PartialFailure);
    assert_eq!(batch.counts.total, 10);
    assert_eq!(batch.counts.errors, 3);
    assert_eq!(batch.counts.processed, 7);
    assert_eq!(
        batch.counts.total,
        batch.counts.processed + batch.counts.errors
    );

    let audit = store.records(batch.id);
    assert_eq!(audit.len(), 10);
    let rejected = &audit[2];
    assert_eq!(rejected.status, RecordStatus::Invalid);
    assert!(rejected.error_detail.as_deref().unwrap().contains("SKU"));
    assert!(rejected.canonical_payload.is_none());
    assert_eq!(rejected.raw_payload["Product Name"], "Unlabelled 1");
    assert!(batch.last_error.unwrap().starts_with("3 of 10 records rejected"));
}

#[tokio::test]
async fn batch_where_every_record_is_rejected_fails() {
    let store = Arc::new(MemoryImportStore::new());
    let batch = run(&store, manual((0..3).map(broken_sale).collect())).await;
    assert_eq!(batch.status, BatchStatus::Failed);
    assert_eq!(batch.counts.errors, 3);
    assert_eq!(store.product_count(), 0);
}

#[tokio::test]
async fn high_error_rate_aborts_the_batch() {
    let store = Arc::new(MemoryImportStore::new());
    let settings = ServiceSettings {
        max_concurrent_batches: 1,
        coordinator: CoordinatorSettings {
            abort_error_rate: 0.5,
            abort_min_records: 4,
        },
    };
    let mut records: Vec<Value> = (0..5).map(broken_sale).collect();
    records.extend((0..5).map(sale));

    let summary = ImportService::new(store.clone(), None, settings)
        .run(manual(records), SubmitOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.status, BatchStatus::Failed);
    assert_eq!(summary.counts.total, 10);
    assert_eq!(summary.counts.processed, 0);
    assert_eq!(summary.counts.errors, 10);
    assert_eq!(
        summary.counts.total,
        summary.counts.processed + summary.counts.errors
    );
    assert!(summary
        .last_error
        .unwrap()
        .starts_with("aborted: 4 of 4 records rejected"));

    let audit = store.records(summary.batch_id);
    assert_eq!(audit.len(), 10);
    assert!(audit.iter().all(|r| r.status == RecordStatus::Invalid));
    assert_eq!(
        audit[4].error_detail.as_deref(),
        Some("not processed: batch aborted")
    );
    assert_eq!(audit[9].raw_payload["SKU"], "SF-0004");
    let batch = store.batch(summary.batch_id).await.unwrap().unwrap();
    assert_eq!(batch.counts, summary.counts);
}

#[tokio::test]
async fn reimporting_the_same_source_creates_nothing_new() {
    let store = Arc::new(MemoryImportStore::new());
    let source = manual((0..20).map(sale).collect());

    let first = run(&store, source.clone()).await;
    let keys_first: Vec<_> = store
        .records(first.id)
        .into_iter()
        .map(|r| r.stable_key)
        .collect();

    let second = run(&store, source).await;
    let keys_second: Vec<_> = store
        .records(second.id)
        .into_iter()
        .map(|r| r.stable_key)
        .collect();

    assert_eq!(store.product_count(), 20);
    assert_eq!(second.counts.skipped, 20);
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(keys_first, keys_second);
}

#[tokio::test]
async fn ephemeral_only_records_resolve_to_the_same_key_every_run() {
    let store = Arc::new(MemoryImportStore::new());
    let page = |id: &str| {
        json!({
            "id": id,
            "name": "Gel-Kayano 14 'Cream Black'",
            "properties": { "brand": { "select": { "name": "ASICS" } } }
        })
    };
    let source = |id: &str| SourceDescriptor::Manual {
        label: "notion".to_owned(),
        schema: RecordSchema::NotionExport,
        records: vec![object(page(id))],
    };

    let first = run(&store, source("page-a")).await;
    let second = run(&store, source("page-b")).await;

    let key_a = store.records(first.id)[0].stable_key.clone().unwrap();
    let key_b = store.records(second.id)[0].stable_key.clone().unwrap();
    assert_eq!(key_a, key_b);
    assert!(key_a.starts_with("name:"));
    assert_eq!(store.product_count(), 1);

    let product = store.product(&key_a).unwrap();
    assert_eq!(product.external_identifiers.len(), 2);
    assert!(product.external_identifiers.iter().all(|id| id.ephemeral));
}

#[tokio::test]
async fn empty_source_completes_with_zero_counts() {
    let store = Arc::new(MemoryImportStore::new());
    let batch = run(&store, manual(Vec::new())).await;
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.counts, BatchCounts::default());
}

#[tokio::test]
async fn unreadable_source_fails_the_batch() {
    let store = Arc::new(MemoryImportStore::new());
    let batch = run(
        &store,
        SourceDescriptor::TabularFile {
            path: "/nonexistent/soleflip/stockx.csv".into(),
            schema: RecordSchema::StockxExport,
            delimiter: None,
            format: None,
        },
    )
    .await;

    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(batch.last_error.unwrap().starts_with("source unreadable"));
    assert!(store.records(batch.id).is_empty());
    assert!(batch.started_at.is_none());
}

#[tokio::test]
async fn csv_export_file_is_imported_end_to_end() {
    let path = std::env::temp_dir().join(format!("soleflip-{}.csv", Uuid::new_v4()));
    std::fs::write(
        &path,
        "Order Number;Sale Date;Item;Style;Sku Size;Listing Price;Seller Fee;Payment Processing;Shipping Fee\n\
         55476797-1;2025-03-14 10:22:01 +00;Nike Dunk Low Panda;DD1391-100;10;182,00;16,38;5,46;0\n\
         55476797-2;2025-03-15 09:00:00 +00;Nike Dunk Low Panda;DD1391-100;9.5;175,00;15,75;5,25;0\n\
         55476797-3;not a date;Samba OG;B75806;8;110,00;9,90;3,30;0\n",
    )
    .unwrap();

    let store = Arc::new(MemoryImportStore::new());
    let batch = run(
        &store,
        SourceDescriptor::TabularFile {
            path: path.clone(),
            schema: RecordSchema::StockxExport,
            delimiter: None,
            format: None,
        },
    )
    .await;
    std::fs::remove_file(&path).ok();

    assert_eq!(batch.status, BatchStatus::PartialFailure);
    assert_eq!(batch.counts.processed, 2);
    assert_eq!(batch.counts.skipped, 1);
    assert_eq!(batch.counts.errors, 1);
    assert_eq!(store.product_count(), 1);

    let audit = store.records(batch.id);
    let facts = &audit[0].canonical_payload.as_ref().unwrap()["facts"];
    assert_eq!(facts["net_proceeds"], "160.16");
    assert_eq!(facts["size"], "US 10");
}

#[tokio::test]
async fn spreadsheet_file_is_imported_end_to_end() {
    let store = Arc::new(MemoryImportStore::new());
    let batch = run(
        &store,
        SourceDescriptor::TabularFile {
            path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/manual_sales.xlsx").into(),
            schema: RecordSchema::ManualSales,
            delimiter: None,
            format: None,
        },
    )
    .await;

    assert_eq!(batch.status, BatchStatus::PartialFailure);
    assert_eq!(
        batch.counts,
        BatchCounts {
            total: 3,
            processed: 2,
            skipped: 0,
            errors: 1,
        }
    );
    assert_eq!(store.product_count(), 2);

    let audit = store.records(batch.id);
    assert_eq!(audit[0].raw_payload["Net Sale"], "120.5");
    assert_eq!(audit[1].raw_payload["Sale Date"], "2025-03-14 00:00:00");
    assert_eq!(audit[2].status, RecordStatus::Invalid);
}

#[tokio::test]
async fn dry_run_writes_no_products() {
    let store = Arc::new(MemoryImportStore::new());
    let summary = service(&store)
        .run(
            manual((0..4).map(sale).collect()),
            SubmitOptions {
                dry_run: true,
                retry_of: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.status, BatchStatus::Completed);
    assert_eq!(summary.counts.processed, 4);
    assert_eq!(store.product_count(), 0);
    assert_eq!(store.count_records(summary.batch_id, RecordStatus::Valid), 4);
}

/// Delegates to a [`MemoryImportStore`] and cancels `token` once `after`
/// products have been reconciled.
struct CancellingStore {
    inner: MemoryImportStore,
    token: CancellationToken,
    after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ImportStore for CancellingStore {
    async fn create_batch(&self, batch: &NewImportBatch) -> Result<BatchSnapshot, StoreError> {
        self.inner.create_batch(batch).await
    }

    async fn batch(&self, id: Uuid) -> Result<Option<BatchSnapshot>, StoreError> {
        self.inner.batch(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.transition(id, from, to, last_error).await
    }

    async fn progress(&self, id: Uuid, counts: BatchCounts) -> Result<(), StoreError> {
        self.inner.progress(id, counts).await
    }

    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.finish(id, from, to, counts, last_error).await
    }

    async fn record(&self, record: &NewImportRecord) -> Result<(), StoreError> {
        self.inner.record(record).await
    }

    async fn reconcile(&self, product: &CanonicalProduct) -> Result<ReconcileOutcome, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.token.cancel();
        }
        self.inner.reconcile(product).await
    }
}

#[tokio::test]
async fn cancellation_stops_between_records() {
    let token = CancellationToken::new();
    let store = Arc::new(CancellingStore {
        inner: MemoryImportStore::new(),
        token: token.clone(),
        after: 3,
        calls: AtomicUsize::new(0),
    });
    let descriptor = manual((0..10).map(sale).collect());
    let batch = store
        .create_batch(&NewImportBatch {
            source_type: descriptor.source_type(),
            source_descriptor: descriptor.to_json().unwrap(),
            retry_of: None,
            retry_count: 0,
            dry_run: false,
        })
        .await
        .unwrap();

    let coordinator = ImportCoordinator::new(store.clone(), None, CoordinatorSettings::default());
    let summary = coordinator.run(&batch, &descriptor, &token).await.unwrap();

    assert_eq!(summary.status, BatchStatus::Failed);
    assert_eq!(summary.counts.processed, 3);
    assert_eq!(summary.counts.errors, 7);
    assert_eq!(
        summary.counts.total,
        summary.counts.processed + summary.counts.errors
    );
    assert_eq!(
        summary.last_error.as_deref(),
        Some("cancelled after 3 of 10 records")
    );
    assert_eq!(store.inner.product_count(), 3);

    let audit = store.inner.records(batch.id);
    assert_eq!(audit.len(), 10);
    assert_eq!(store.inner.count_records(batch.id, RecordStatus::Persisted), 3);
    assert_eq!(
        audit[3].error_detail.as_deref(),
        Some("not processed: batch cancelled")
    );
}

/// Delegates to a [`MemoryImportStore`] and notes the batch status each time
/// an audit record is written.
#[derive(Default)]
struct StatusTrackingStore {
    inner: MemoryImportStore,
    seen: Mutex<Vec<BatchStatus>>,
}

#[async_trait]
impl ImportStore for StatusTrackingStore {
    async fn create_batch(&self, batch: &NewImportBatch) -> Result<BatchSnapshot, StoreError> {
        self.inner.create_batch(batch).await
    }

    async fn batch(&self, id: Uuid) -> Result<Option<BatchSnapshot>, StoreError> {
        self.inner.batch(id).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.transition(id, from, to, last_error).await
    }

    async fn progress(&self, id: Uuid, counts: BatchCounts) -> Result<(), StoreError> {
        self.inner.progress(id, counts).await
    }

    async fn finish(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        counts: BatchCounts,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.finish(id, from, to, counts, last_error).await
    }

    async fn record(&self, record: &NewImportRecord) -> Result<(), StoreError> {
        if let Some(batch) = self.inner.batch(record.batch_id).await? {
            self.seen.lock().unwrap().push(batch.status);
        }
        self.inner.record(record).await
    }

    async fn reconcile(&self, product: &CanonicalProduct) -> Result<ReconcileOutcome, StoreError> {
        self.inner.reconcile(product).await
    }
}

#[tokio::test]
async fn batch_stays_validating_until_a_record_passes() {
    let store = Arc::new(StatusTrackingStore::default());
    let summary = ImportService::new(store.clone(), None, ServiceSettings::default())
        .run(
            manual(vec![broken_sale(1), broken_sale(2), sale(3)]),
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, BatchStatus::PartialFailure);
    assert_eq!(
        *store.seen.lock().unwrap(),
        vec![
            BatchStatus::Validating,
            BatchStatus::Validating,
            BatchStatus::Processing,
        ]
    );
}

#[tokio::test]
async fn all_rejected_batch_fails_without_entering_processing() {
    let store = Arc::new(StatusTrackingStore::default());
    let summary = ImportService::new(store.clone(), None, ServiceSettings::default())
        .run(
            manual(vec![broken_sale(1), broken_sale(2)]),
            SubmitOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, BatchStatus::Failed);
    assert!(store
        .seen
        .lock()
        .unwrap()
        .iter()
        .all(|status| *status == BatchStatus::Validating));
    let batch = store.inner.batch(summary.batch_id).await.unwrap().unwrap();
    assert!(batch.started_at.is_some());
}

#[tokio::test]
async fn finished_batches_reject_further_writes() {
    let store = Arc::new(MemoryImportStore::new());
    let batch = run(&store, manual(vec![sale(1)])).await;

    let err = store
        .transition(batch.id, BatchStatus::Completed, BatchStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert!(store.progress(batch.id, BatchCounts::default()).await.is_err());
}
