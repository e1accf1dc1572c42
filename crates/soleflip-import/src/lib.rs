//! Multi-source batch import pipeline.
//!
//! A batch reads records from one [`SourceDescriptor`], validates each one
//! against its [`RecordSchema`](soleflip_core::RecordSchema), transforms it
//! into a [`CanonicalProduct`] keyed by a [`StableKey`], and reconciles it
//! with what the [`ImportStore`] already holds. [`ImportService`] runs
//! batches in the background and answers status queries.

pub mod coordinator;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod parse;
pub mod service;
pub mod source;
pub mod store;
pub mod transform;
pub mod validate;

pub use coordinator::{BatchSummary, CoordinatorSettings, ImportCoordinator};
pub use error::{FieldError, ImportError, ParseError, StoreError, ValidationError};
pub use identity::{ExternalIdentifier, KeySource, Reconciliation, StableKey};
pub use parse::RawRecord;
pub use service::{ImportService, ServiceSettings, SubmitOptions};
pub use source::{OrderSource, SourceDescriptor, TabularFormat};
pub use store::{BatchSnapshot, ImportStore, MemoryImportStore, PgImportStore, ReconcileOutcome};
pub use transform::{CanonicalProduct, CanonicalRecord};
pub use validate::{validator_for, RecordValidator, ValidatedRecord};
