//! Enumerations shared by the import pipeline and its persistence layer.
//!
//! Every enum round-trips through its `as_str` form, which is also the value
//! stored in the database `TEXT` columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(CoreError::UnknownVariant {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Where a batch's records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    LiveApi,
    TabularFile,
    StructuredFile,
    Manual,
}

string_enum!(SourceType, "source type", {
    LiveApi => "live_api",
    TabularFile => "tabular_file",
    StructuredFile => "structured_file",
    Manual => "manual",
});

/// Lifecycle of an import batch.
///
/// ```text
/// pending -> validating -> processing -> completed | partial_failure | failed
/// ```
///
/// A batch enters `validating` once its source has loaded and `processing`
/// once the first record passes validation. A `pending` batch whose source
/// cannot be read goes straight to `failed`. `validating` finishes directly
/// as `completed` when the source holds no records, or as `failed` when
/// every record is rejected. Any non-terminal state may fall to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Validating,
    Processing,
    Completed,
    Failed,
    PartialFailure,
}

string_enum!(BatchStatus, "batch status", {
    Pending => "pending",
    Validating => "validating",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    PartialFailure => "partial_failure",
});

impl BatchStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::PartialFailure
        )
    }

    /// Whether a batch currently in `self` may move to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use BatchStatus::{Completed, Failed, PartialFailure, Pending, Processing, Validating};
        matches!(
            (self, next),
            (Pending, Validating | Failed)
                | (Validating, Processing | Completed | Failed)
                | (Processing, Completed | Failed | PartialFailure)
        )
    }

    /// Checked transition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalTransition`] when the move is not allowed.
    pub fn transition(self, next: Self) -> Result<Self, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Only failed and partially failed batches may be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failed | Self::PartialFailure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Valid,
    Invalid,
    Persisted,
    SkippedDuplicate,
}

string_enum!(RecordStatus, "record status", {
    Pending => "pending",
    Valid => "valid",
    Invalid => "invalid",
    Persisted => "persisted",
    SkippedDuplicate => "skipped_duplicate",
});

/// The per-source validation rule set applied to raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSchema {
    StockxApiOrder,
    StockxExport,
    AliasExport,
    NotionExport,
    ManualSales,
}

string_enum!(RecordSchema, "record schema", {
    StockxApiOrder => "stockx-api-order",
    StockxExport => "stockx-export",
    AliasExport => "alias-export",
    NotionExport => "notion-export",
    ManualSales => "manual-sales",
});

impl RecordSchema {
    pub const ALL: [Self; 5] = [
        Self::StockxApiOrder,
        Self::StockxExport,
        Self::AliasExport,
        Self::NotionExport,
        Self::ManualSales,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_round_trips_through_str() {
        for status in [
            BatchStatus::Pending,
            BatchStatus::Validating,
            BatchStatus::Processing,
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::PartialFailure,
        ] {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "running".parse::<BatchStatus>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownVariant { kind: "batch status", .. }));
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        let s = BatchStatus::Pending
            .transition(BatchStatus::Validating)
            .and_then(|s| s.transition(BatchStatus::Processing))
            .and_then(|s| s.transition(BatchStatus::PartialFailure))
            .unwrap();
        assert_eq!(s, BatchStatus::PartialFailure);
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::PartialFailure,
        ] {
            assert!(terminal.is_terminal());
            assert!(terminal.transition(BatchStatus::Processing).is_err());
            assert!(terminal.transition(BatchStatus::Failed).is_err());
        }
    }

    #[test]
    fn partial_failure_requires_processing() {
        assert!(!BatchStatus::Validating.can_transition_to(BatchStatus::PartialFailure));
        assert!(!BatchStatus::Pending.can_transition_to(BatchStatus::Processing));
    }

    #[test]
    fn only_failed_outcomes_are_retryable() {
        assert!(BatchStatus::Failed.is_retryable());
        assert!(BatchStatus::PartialFailure.is_retryable());
        assert!(!BatchStatus::Completed.is_retryable());
        assert!(!BatchStatus::Processing.is_retryable());
    }

    #[test]
    fn schema_serde_uses_kebab_case() {
        let json = serde_json::to_string(&RecordSchema::AliasExport).unwrap();
        assert_eq!(json, "\"alias-export\"");
        for schema in RecordSchema::ALL {
            let parsed: RecordSchema = schema.as_str().parse().unwrap();
            assert_eq!(parsed, schema);
        }
    }

    #[test]
    fn source_type_serde_matches_column_value() {
        let json = serde_json::to_string(&SourceType::StructuredFile).unwrap();
        assert_eq!(json, format!("\"{}\"", SourceType::StructuredFile.as_str()));
    }
}
