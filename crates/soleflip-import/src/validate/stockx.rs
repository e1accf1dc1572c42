//! StockX order payloads (live API) and StockX sales exports (CSV).

use soleflip_core::RecordSchema;

use super::{Facts, Fields, RecordValidator, ValidatedRecord};
use crate::error::ValidationError;
use crate::identity::ExternalIdentifier;
use crate::normalize;
use crate::parse::RawRecord;

/// One order from the selling order-history endpoint.
pub struct StockxApiOrderValidator;

impl RecordValidator for StockxApiOrderValidator {
    fn schema(&self) -> RecordSchema {
        RecordSchema::StockxApiOrder
    }

    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let mut fields = Fields::new(record);
        let order_number = fields.required("orderNumber");
        let created_at = fields.datetime("createdAt", true, false);
        let amount = fields.amount("amount", true);
        let name = fields.required("product.productName");
        if amount.is_some_and(|a| a.is_sign_negative()) {
            fields.reject("amount", "sale amount is negative");
        }

        let product_id = fields.text("product.productId");
        let variant_id = fields.text("variant.variantId");
        let style_code = fields
            .text("product.styleId")
            .and_then(|s| normalize::style_code(&s));
        let size = normalize::stockx_size(fields.text("variant.variantValue").as_deref());
        let currency = fields.text("currencyCode");
        let status = fields.text("status");
        let listing_id = fields.text("listingId");

        fields.finish(|| {
            let mut identifiers = Vec::new();
            if let Some(id) = &product_id {
                identifiers.push(ExternalIdentifier::stable("stockx", "product", id.as_str()));
            }
            if let Some(id) = &variant_id {
                identifiers.push(ExternalIdentifier::ephemeral("stockx", "variant", id.as_str()));
            }
            ValidatedRecord {
                schema: RecordSchema::StockxApiOrder,
                name: name.unwrap_or_default(),
                style_code,
                platform_product_id: product_id,
                brand: None,
                identifiers,
                facts: Facts::default()
                    .text("order_number", order_number)
                    .date("sale_date", created_at)
                    .amount("sale_amount", amount)
                    .text("currency", currency)
                    .text("status", status)
                    .text("listing_id", listing_id)
                    .text("variant_id", variant_id)
                    .text("size", Some(size))
                    .into_map(),
            }
        })
    }
}

/// A row of the StockX "sales" CSV export.
pub struct StockxExportValidator;

impl RecordValidator for StockxExportValidator {
    fn schema(&self) -> RecordSchema {
        RecordSchema::StockxExport
    }

    fn validate(&self, record: &RawRecord) -> Result<ValidatedRecord, ValidationError> {
        let mut fields = Fields::new(record);
        let order_number = fields.required("Order Number");
        let sale_date = fields.datetime("Sale Date", true, false);
        let name = fields.required("Item");
        let listing_price = fields.amount("Listing Price", true);
        let seller_fee = fields.amount("Seller Fee", false);
        let processing_fee = fields.amount("Payment Processing", false);
        let shipping_fee = fields.amount("Shipping Fee", false);
        let total_payout = if fields.text("Total Payout").is_some() {
            fields.amount("Total Payout", false)
        } else {
            fields.amount("Total Gross Amount (Total Payout)", false)
        };

        let style_code = fields
            .first_text(&["Style", "SKU"])
            .and_then(|s| normalize::style_code(&s));
        let size = normalize::stockx_size(fields.first_text(&["Sku Size", "Size"]).as_deref());
        let net_proceeds = match (listing_price, seller_fee, processing_fee, shipping_fee) {
            (Some(price), Some(seller), Some(processing), Some(shipping)) => {
                Some(price - seller - processing - shipping)
            }
            _ => None,
        };
        let buyer_country = fields.first_text(&["Buyer Destination Country", "Buyer Country"]);
        let invoice_number = fields.text("Invoice Number");

        fields.finish(|| ValidatedRecord {
            schema: RecordSchema::StockxExport,
            name: name.unwrap_or_default(),
            style_code,
            platform_product_id: None,
            brand: None,
            identifiers: Vec::new(),
            facts: Facts::default()
                .text("order_number", order_number)
                .date("sale_date", sale_date)
                .amount("listing_price", listing_price)
                .amount("seller_fee", seller_fee)
                .amount("payment_processing_fee", processing_fee)
                .amount("shipping_fee", shipping_fee)
                .amount("total_payout", total_payout)
                .amount("net_proceeds", net_proceeds)
                .text("size", Some(size))
                .text("buyer_country", buyer_country)
                .text("invoice_number", invoice_number)
                .into_map(),
        })
    }
}
