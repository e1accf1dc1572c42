//! What a batch imports from, and how its records are loaded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soleflip_core::{RecordSchema, SourceType};
use soleflip_stockx::{OrderHistoryFilter, StockxClient, StockxError};

use crate::error::{ImportError, ParseError};
use crate::parse::{self, RawRecord};

/// A batch's source. Stored verbatim on the batch row so a failed batch can
/// be retried from the same input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    LiveOrderHistory {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        order_status: Option<String>,
    },
    TabularFile {
        path: PathBuf,
        schema: RecordSchema,
        delimiter: Option<char>,
        /// Taken from the file extension when absent.
        #[serde(default)]
        format: Option<TabularFormat>,
    },
    StructuredFile {
        path: PathBuf,
        schema: RecordSchema,
        array_field: Option<String>,
        #[serde(default)]
        flatten: bool,
    },
    Manual {
        label: String,
        schema: RecordSchema,
        records: Vec<RawRecord>,
    },
}

/// How a tabular file is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabularFormat {
    /// Delimited text.
    Csv,
    /// A spreadsheet workbook; only its first sheet is read.
    Xlsx,
}

impl TabularFormat {
    const WORKBOOK_EXTENSIONS: [&'static str; 4] = ["xlsx", "xlsm", "xls", "ods"];

    /// Workbook extensions select [`TabularFormat::Xlsx`]; anything else is
    /// read as delimited text.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let is_workbook = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                Self::WORKBOOK_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_workbook {
            Self::Xlsx
        } else {
            Self::Csv
        }
    }
}

impl SourceDescriptor {
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::LiveOrderHistory { .. } => SourceType::LiveApi,
            Self::TabularFile { .. } => SourceType::TabularFile,
            Self::StructuredFile { .. } => SourceType::StructuredFile,
            Self::Manual { .. } => SourceType::Manual,
        }
    }

    /// The validator applied to every record of this source.
    #[must_use]
    pub fn schema(&self) -> RecordSchema {
        match self {
            Self::LiveOrderHistory { .. } => RecordSchema::StockxApiOrder,
            Self::TabularFile { schema, .. }
            | Self::StructuredFile { schema, .. }
            | Self::Manual { schema, .. } => *schema,
        }
    }

    /// # Errors
    ///
    /// Returns [`ImportError::Descriptor`] if the value does not describe a
    /// known source.
    pub fn from_json(value: &Value) -> Result<Self, ImportError> {
        serde_json::from_value(value.clone()).map_err(ImportError::Descriptor)
    }

    /// # Errors
    ///
    /// Returns [`ImportError::Descriptor`] if a field cannot be represented
    /// as JSON, such as a file path that is not valid UTF-8.
    pub fn to_json(&self) -> Result<Value, ImportError> {
        serde_json::to_value(self).map_err(ImportError::Descriptor)
    }

    /// Loads every record of this source, in source order.
    ///
    /// # Errors
    ///
    /// - [`ImportError::Parse`] for unreadable or malformed files.
    /// - [`ImportError::Marketplace`] when the live fetch fails.
    /// - [`ImportError::NoOrderSource`] for a live source without a client.
    pub async fn load(&self, orders: Option<&dyn OrderSource>) -> Result<Vec<RawRecord>, ImportError> {
        match self {
            Self::LiveOrderHistory {
                from,
                to,
                order_status,
            } => {
                let orders = orders.ok_or(ImportError::NoOrderSource)?;
                let filter = OrderHistoryFilter {
                    from_date: *from,
                    to_date: *to,
                    order_status: order_status.clone(),
                    ..OrderHistoryFilter::default()
                };
                let values = orders.historical_orders(&filter).await?;
                Ok(parse::json::records_from_values(values)?)
            }
            Self::TabularFile {
                path,
                delimiter,
                format,
                ..
            } => {
                let bytes = read_source(path).await?;
                match format.unwrap_or_else(|| TabularFormat::from_path(path)) {
                    TabularFormat::Csv => {
                        let delimiter = delimiter.and_then(|c| u8::try_from(c).ok());
                        Ok(parse::csv::parse_csv(&bytes, delimiter)?)
                    }
                    TabularFormat::Xlsx => Ok(parse::xlsx::parse_xlsx(&bytes)?),
                }
            }
            Self::StructuredFile {
                path,
                array_field,
                flatten,
                ..
            } => {
                let bytes = read_source(path).await?;
                Ok(parse::json::parse_json(&bytes, array_field.as_deref(), *flatten)?)
            }
            Self::Manual { records, .. } => Ok(records.clone()),
        }
    }
}

async fn read_source(path: &Path) -> Result<Vec<u8>, ParseError> {
    tokio::fs::read(path).await.map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Where live order history comes from. Implemented by [`StockxClient`].
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn historical_orders(&self, filter: &OrderHistoryFilter) -> Result<Vec<Value>, StockxError>;
}

#[async_trait]
impl OrderSource for StockxClient {
    async fn historical_orders(&self, filter: &OrderHistoryFilter) -> Result<Vec<Value>, StockxError> {
        StockxClient::historical_orders(self, filter).await
    }
}
