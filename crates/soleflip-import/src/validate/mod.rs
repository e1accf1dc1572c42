//! Per-schema record validation.
//!
//! Each [`RecordSchema`] has exactly one validator. A validator checks
//! required fields, types and business rules, normalizes values, and
//! reports every problem in the record at once.

mod alias;
mod manual;
mod notion;
mod stockx;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use soleflip_core::RecordSchema;

use crate::error::{FieldError, ValidationError};
use crate::identity::ExternalIdentifier;
use crate::normalize;
use crate::parse::RawRecord;

pub use alias::AliasExportValidator;
pub use manual::ManualSalesValidator;
pub use notion::NotionExportValidator;
pub use stockx::{StockxApiOrderValidator, StockxExportValidator};

/// A record that passed validation, in schema-independent form.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub schema: RecordSchema,
    /// Display name of the product.
    pub name: String,
    /// Normalized manufacturer style code.
    pub style_code: Option<String>,
    pub platform_product_id: Option<String>,
    pub brand: Option<String>,
    pub identifiers: Vec<ExternalIdentifier>,
    /// Normalized per-record facts: order numbers, amounts, dates, sizes.
    pub facts: Map<String, Value>,
}

pub trait RecordValidator: Send + Sync {
    fn schema(&self) -> RecordSchema;

    /// # Errors
    ///
    /// Returns every [`FieldError`] found in `record`.
    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError>;
}

/// The validator for `schema`.
#[must_use]
pub fn validator_for(schema: RecordSchema) -> &'static dyn RecordValidator {
    match schema {
        RecordSchema::StockxApiOrder => &StockxApiOrderValidator,
        RecordSchema::StockxExport => &StockxExportValidator,
        RecordSchema::AliasExport => &AliasExportValidator,
        RecordSchema::NotionExport => &NotionExportValidator,
        RecordSchema::ManualSales => &ManualSalesValidator,
    }
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// Looks up `path` in a record. Dotted paths match either a literal dotted
/// key (flattened JSON) or nested objects, or any mix of the two.
pub(crate) fn lookup<'a>(record: &'a RawRecord, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let mut split = path.len();
    while let Some(dot) = path[..split].rfind('.') {
        if let Some(Value::Object(nested)) = record.get(&path[..dot]) {
            if let Some(found) = lookup(nested, &path[dot + 1..]) {
                return Some(found);
            }
        }
        split = dot;
    }
    None
}

/// A value as trimmed text. Blank strings and nulls are absent.
fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Accumulates field problems while a validator reads one record.
pub(crate) struct Fields<'a> {
    record: &'a RawRecord,
    problems: Vec<FieldError>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(record: &'a RawRecord) -> Self {
        Self {
            record,
            problems: Vec::new(),
        }
    }

    pub(crate) fn raw(&self, path: &str) -> Option<&'a Value> {
        lookup(self.record, path)
    }

    pub(crate) fn text(&self, path: &str) -> Option<String> {
        self.raw(path).and_then(as_text)
    }

    /// First present field among `paths`.
    pub(crate) fn first_text(&self, paths: &[&str]) -> Option<String> {
        paths.iter().find_map(|p| self.text(p))
    }

    pub(crate) fn required(&mut self, path: &str) -> Option<String> {
        let value = self.text(path);
        if value.is_none() {
            self.missing(path);
        }
        value
    }

    pub(crate) fn missing(&mut self, field: &str) {
        self.problems.push(FieldError::Missing(field.to_owned()));
    }

    pub(crate) fn amount(&mut self, path: &str, required: bool) -> Option<Decimal> {
        let raw = if required {
            self.required(path)?
        } else {
            self.text(path)?
        };
        let parsed = normalize::parse_amount(&raw);
        if parsed.is_none() {
            self.problems.push(FieldError::Currency {
                field: path.to_owned(),
                value: raw,
            });
        }
        parsed
    }

    pub(crate) fn datetime(&mut self, path: &str, required: bool, day_first: bool) -> Option<DateTime<Utc>> {
        let raw = if required {
            self.required(path)?
        } else {
            self.text(path)?
        };
        let parsed = if day_first {
            normalize::parse_day_first(&raw)
        } else {
            normalize::parse_datetime(&raw)
        };
        if parsed.is_none() {
            self.problems.push(FieldError::Date {
                field: path.to_owned(),
                value: raw,
            });
        }
        parsed
    }

    pub(crate) fn reject(&mut self, field: &str, reason: impl Into<String>) {
        self.problems.push(FieldError::Invalid {
            field: field.to_owned(),
            reason: reason.into(),
        });
    }

    /// `Ok(build())` if no problem was recorded.
    pub(crate) fn finish<F>(self, build: F) -> Result<ValidatedRecord, ValidationError>
    where
        F: FnOnce() -> ValidatedRecord,
    {
        if self.problems.is_empty() {
            Ok(build())
        } else {
            Err(ValidationError(self.problems))
        }
    }
}

/// Builder for the `facts` map; `None` values are skipped.
#[derive(Default)]
pub(crate) struct Facts(Map<String, Value>);

impl Facts {
    pub(crate) fn text(mut self, key: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.0.insert(key.to_owned(), Value::String(value.into()));
        }
        self
    }

    /// Amounts are stored as decimal strings so no precision is lost.
    pub(crate) fn amount(self, key: &str, value: Option<Decimal>) -> Self {
        self.text(key, value.map(|v| v.to_string()))
    }

    pub(crate) fn date(self, key: &str, value: Option<DateTime<Utc>>) -> Self {
        self.text(key, value.map(|v| v.to_rfc3339()))
    }

    pub(crate) fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;
