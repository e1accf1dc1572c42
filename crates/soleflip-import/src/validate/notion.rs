//! Notion inventory pages exported as JSON.

use rust_decimal::Decimal;
use serde_json::Value;
use soleflip_core::RecordSchema;

use super::{Facts, Fields, RecordValidator, ValidatedRecord};
use crate::error::ValidationError;
use crate::identity::ExternalIdentifier;
use crate::normalize;
use crate::parse::RawRecord;

pub struct NotionExportValidator;

impl RecordValidator for NotionExportValidator {
    fn schema(&self) -> RecordSchema {
        RecordSchema::NotionExport
    }

    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let mut fields = Fields::new(record);
        let page_id = fields.required("id");
        let name = fields
            .text("name")
            .or_else(|| property_text(&fields, "name"))
            .or_else(|| property_text(&fields, "Name"));
        if name.is_none() {
            fields.missing("name");
        }
        let last_edited = fields.datetime("last_edited_time", false, false);

        let style_code = property_text(&fields, "sku")
            .or_else(|| property_text(&fields, "style"))
            .and_then(|s| normalize::style_code(&s));
        let purchase_price = property_number(&mut fields, "purchase_price");
        let target_price = property_number(&mut fields, "target_price");
        let database_id = fields.text("database_id");

        let facts = Facts::default()
            .text("notion_database_id", database_id)
            .text("size", property_text(&fields, "size"))
            .text("status", property_text(&fields, "status"))
            .text("stockx_order_number", property_text(&fields, "stockx_order"))
            .text("alias_order_number", property_text(&fields, "alias_order"))
            .amount("purchase_price", purchase_price)
            .amount("target_price", target_price)
            .date("last_edited", last_edited)
            .into_map();
        let brand = property_text(&fields, "brand");

        fields.finish(|| ValidatedRecord {
            schema: RecordSchema::NotionExport,
            name: name.unwrap_or_default(),
            style_code,
            platform_product_id: None,
            brand,
            identifiers: page_id
                .into_iter()
                .map(|id| ExternalIdentifier::ephemeral("notion", "page", id))
                .collect(),
            facts,
        })
    }
}

/// Text of a rich-text, title, or select property.
fn property_text(fields: &Fields<'_>, property: &str) -> Option<String> {
    let base = format!("properties.{property}");
    for list in ["rich_text", "title"] {
        if let Some(Value::Array(parts)) = fields.raw(&format!("{base}.{list}")) {
            let text: String = parts
                .iter()
                .filter_map(|part| {
                    part.get("plain_text")
                        .or_else(|| part.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect();
            if !text.trim().is_empty() {
                return Some(text.trim().to_owned());
            }
        }
    }
    fields
        .text(&format!("{base}.select.name"))
        .or_else(|| fields.text(&base))
}

fn property_number(fields: &mut Fields<'_>, property: &str) -> Option<Decimal> {
    let path = format!("properties.{property}.number");
    match fields.raw(&path) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => {
            let parsed = normalize::parse_amount(&n.to_string());
            if parsed.is_none() {
                fields.reject(&path, "not a finite number");
            }
            parsed
        }
        Some(other) => {
            fields.reject(&path, format!("expected a number, found {other}"));
            None
        }
    }
}
