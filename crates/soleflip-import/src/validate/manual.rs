//! The operator's own sales sheet.

use soleflip_core::RecordSchema;

use super::{Facts, Fields, RecordValidator, ValidatedRecord};
use crate::error::ValidationError;
use crate::normalize;
use crate::parse::RawRecord;

pub struct ManualSalesValidator;

impl RecordValidator for ManualSalesValidator {
    fn schema(&self) -> RecordSchema {
        RecordSchema::ManualSales
    }

    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let mut fields = Fields::new(record);
        let sku = fields.required("SKU");
        let sale_date = fields.datetime("Sale Date", true, true);
        let status = fields.required("Status").map(|s| s.to_lowercase());
        let gross_buy = fields.amount("Gross Buy", false);
        let net_buy = fields.amount("Net Buy", false);
        let gross_sale = fields.amount("Gross Sale", false);
        let net_sale = fields.amount("Net Sale", false);

        let style_code = sku.as_deref().and_then(normalize::style_code);
        if sku.is_some() && style_code.is_none() {
            fields.reject("SKU", "placeholder value is not a SKU");
        }
        let name = fields.text("Product Name").or_else(|| sku.clone());
        let profit = net_sale.zip(net_buy).map(|(sale, buy)| sale - buy);
        let platform = fields.text("Platform").unwrap_or_else(|| "Manual".to_owned());
        let brand = fields.text("Brand");

        fields.finish(|| ValidatedRecord {
            schema: RecordSchema::ManualSales,
            name: name.unwrap_or_default(),
            style_code,
            platform_product_id: None,
            brand,
            identifiers: Vec::new(),
            facts: Facts::default()
                .text("status", status)
                .text("platform", Some(platform))
                .date("sale_date", sale_date)
                .amount("gross_buy", gross_buy)
                .amount("net_buy", net_buy)
                .amount("gross_sale", gross_sale)
                .amount("net_sale", net_sale)
                .amount("profit", profit)
                .into_map(),
        })
    }
}
