//! Alias (GOAT) seller exports.

use soleflip_core::RecordSchema;

use super::{Facts, Fields, RecordValidator, ValidatedRecord};
use crate::error::ValidationError;
use crate::normalize;
use crate::parse::RawRecord;

/// Alias reports full sale amounts and no fees; dates are day-first.
pub struct AliasExportValidator;

impl RecordValidator for AliasExportValidator {
    fn schema(&self) -> RecordSchema {
        RecordSchema::AliasExport
    }

    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let mut fields = Fields::new(record);
        let order_number = fields.required("ORDER_NUMBER");
        let name = fields.required("NAME");
        let sale_price = fields.amount("PRODUCT_PRICE_CENTS_SALE_PRICE", true);
        let credited_at = fields.datetime("CREDIT_DATE", true, true);
        let purchased_at = fields.datetime("PURCHASED_DATE", false, true);

        let style_code = fields.text("SKU").and_then(|s| normalize::style_code(&s));
        let size = normalize::alias_size(fields.text("SIZE").as_deref());
        let seller = fields.text("USERNAME");

        fields.finish(|| ValidatedRecord {
            schema: RecordSchema::AliasExport,
            name: name.unwrap_or_default(),
            style_code,
            platform_product_id: None,
            brand: None,
            identifiers: Vec::new(),
            facts: Facts::default()
                .text("order_number", order_number)
                .text("platform", Some("alias"))
                .date("sale_date", credited_at)
                .date("purchase_date", purchased_at)
                .amount("sale_price", sale_price)
                .amount("net_proceeds", sale_price)
                .text("size", size)
                .text("seller", seller)
                .into_map(),
        })
    }
}
