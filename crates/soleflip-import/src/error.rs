use std::path::PathBuf;

use soleflip_core::BatchStatus;
use soleflip_db::DbError;
use soleflip_stockx::StockxError;
use thiserror::Error;
use uuid::Uuid;

/// The source could not be turned into records at all.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unreadable spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("header row has no usable column names")]
    NoColumns,

    #[error("field `{field}` is not an array of records")]
    NotAnArray { field: String },

    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },
}

/// One reason a record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing required field `{0}`")]
    Missing(String),

    #[error("`{field}` is not a valid amount: {value:?}")]
    Currency { field: String, value: String },

    #[error("`{field}` is not a recognised date: {value:?}")]
    Date { field: String, value: String },

    #[error("`{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

/// Every problem found in one record. Validation never stops at the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join(.0))]
pub struct ValidationError(pub Vec<FieldError>);

fn join(problems: &[FieldError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("import batch {0} not found")]
    BatchNotFound(Uuid),

    #[error("import batch {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    },

    #[error("stored value is unreadable: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Marketplace(#[from] StockxError),

    #[error("batch {id} is {status}; only failed or partially failed batches can be retried")]
    NotRetryable { id: Uuid, status: BatchStatus },

    #[error("live order import needs a marketplace client")]
    NoOrderSource,

    #[error("source descriptor is unreadable: {0}")]
    Descriptor(#[source] serde_json::Error),

    #[error("import service is shutting down")]
    ShuttingDown,
}
