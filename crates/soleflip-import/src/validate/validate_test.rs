use super::*;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("test record must be an object, got {other}"),
    }
}

fn dec(s: &str) -> Value {
    Value::String(Decimal::from_str(s).unwrap().to_string())
}

#[test]
fn every_schema_has_its_own_validator() {
    for schema in RecordSchema::ALL {
        assert_eq!(validator_for(schema).schema(), schema);
    }
}

#[test]
fn lookup_reads_nested_and_flattened_paths() {
    let nested = record(json!({ "product": { "styleId": "DD1391-100" } }));
    let flat = record(json!({ "product.styleId": "DD1391-100" }));
    let mixed = record(json!({ "properties": { "size.select.name": "42" } }));
    assert_eq!(lookup(&nested, "product.styleId"), Some(&json!("DD1391-100")));
    assert_eq!(lookup(&flat, "product.styleId"), Some(&json!("DD1391-100")));
    assert_eq!(lookup(&mixed, "properties.size.select.name"), Some(&json!("42")));
    assert_eq!(lookup(&nested, "product.missing"), None);
}

#[test]
fn api_order_is_normalized() {
    let raw = record(json!({
        "orderNumber": "55476797-55376556",
        "status": "COMPLETED",
        "amount": "182.00",
        "currencyCode": "EUR",
        "createdAt": "2025-03-14T10:22:01Z",
        "product": { "productId": "p-1", "productName": "Nike Dunk Low Panda", "styleId": "dd1391-100" },
        "variant": { "variantId": "v-9", "variantValue": "10.5" }
    }));
    let validated = validator_for(RecordSchema::StockxApiOrder).validate(&raw).unwrap();

    assert_eq!(validated.name, "Nike Dunk Low Panda");
    assert_eq!(validated.style_code.as_deref(), Some("DD1391-100"));
    assert_eq!(validated.platform_product_id.as_deref(), Some("p-1"));
    assert_eq!(validated.facts["size"], "US 10.5");
    assert_eq!(validated.facts["sale_amount"], dec("182.00"));
    assert_eq!(validated.facts["sale_date"], "2025-03-14T10:22:01+00:00");
    assert!(validated
        .identifiers
        .iter()
        .any(|id| id.kind == "variant" && id.ephemeral));
}

#[test]
fn api_order_reports_every_problem_at_once() {
    let raw = record(json!({ "amount": "lots", "createdAt": "yesterday" }));
    let err = validator_for(RecordSchema::StockxApiOrder)
        .validate(&raw)
        .unwrap_err();

    assert_eq!(err.0.len(), 4);
    assert!(err.0.contains(&FieldError::Missing("orderNumber".to_owned())));
    assert!(err.0.contains(&FieldError::Missing("product.productName".to_owned())));
    assert!(err.to_string().contains("createdAt"));
    assert!(err.to_string().contains("amount"));
}

#[test]
fn stockx_export_computes_net_proceeds() {
    let raw = record(json!({
        "Order Number": "55476797-55376556",
        "Sale Date": "2025-03-14 10:22:01 +00",
        "Item": "Nike Dunk Low Panda",
        "Style": "DD1391-100",
        "Sku Size": "10",
        "Listing Price": "€182,00",
        "Seller Fee": "16,38",
        "Payment Processing": "5,46",
        "Shipping Fee": "0",
        "Total Payout": "160,16"
    }));
    let validated = validator_for(RecordSchema::StockxExport).validate(&raw).unwrap();

    assert_eq!(validated.facts["net_proceeds"], dec("160.16"));
    assert_eq!(validated.facts["size"], "US 10");
    assert_eq!(validated.style_code.as_deref(), Some("DD1391-100"));
    assert!(validated.identifiers.is_empty());
}

#[test]
fn stockx_export_without_fees_has_no_net_proceeds() {
    let raw = record(json!({
        "Order Number": "1",
        "Sale Date": "2025-03-14",
        "Item": "Samba OG",
        "Listing Price": "100"
    }));
    let validated = validator_for(RecordSchema::StockxExport).validate(&raw).unwrap();
    assert!(validated.facts.get("net_proceeds").is_none());
    assert_eq!(validated.facts["size"], "One Size");
    assert!(validated.style_code.is_none());
}

#[test]
fn alias_dates_are_day_first() {
    let raw = record(json!({
        "ORDER_NUMBER": "A-77",
        "NAME": "Jordan 4 Retro Military Black",
        "PRODUCT_PRICE_CENTS_SALE_PRICE": "215",
        "CREDIT_DATE": "01/02/25",
        "SKU": "DH6927-111",
        "SIZE": "106"
    }));
    let validated = validator_for(RecordSchema::AliasExport).validate(&raw).unwrap();
    assert_eq!(validated.facts["sale_date"], "2025-02-01T00:00:00+00:00");
    assert_eq!(validated.facts["size"], "Size 106");
    assert_eq!(validated.facts["net_proceeds"], dec("215"));
}

#[test]
fn notion_page_reads_properties() {
    let raw = record(json!({
        "id": "0f3c-page",
        "name": "Salomon XT-6",
        "properties": {
            "brand": { "select": { "name": "Salomon" } },
            "sku": { "rich_text": [{ "text": { "content": "L41086600" } }] },
            "purchase_price": { "number": 120.5 },
            "status": { "select": { "name": "In Stock" } }
        }
    }));
    let validated = validator_for(RecordSchema::NotionExport).validate(&raw).unwrap();

    assert_eq!(validated.brand.as_deref(), Some("Salomon"));
    assert_eq!(validated.style_code.as_deref(), Some("L41086600"));
    assert_eq!(validated.facts["purchase_price"], dec("120.5"));
    assert_eq!(validated.identifiers.len(), 1);
    assert!(validated.identifiers[0].ephemeral);
}

#[test]
fn notion_title_property_supplies_the_name() {
    let raw = record(json!({
        "id": "p",
        "properties": { "Name": { "title": [{ "plain_text": "Gel-1130" }] } }
    }));
    let validated = validator_for(RecordSchema::NotionExport).validate(&raw).unwrap();
    assert_eq!(validated.name, "Gel-1130");
}

#[test]
fn notion_rejects_non_numeric_prices() {
    let raw = record(json!({
        "name": "x",
        "properties": { "purchase_price": { "number": "cheap" } }
    }));
    let err = validator_for(RecordSchema::NotionExport)
        .validate(&raw)
        .unwrap_err();
    assert!(err.0.contains(&FieldError::Missing("id".to_owned())));
    assert_eq!(err.0.len(), 2);
}

#[test]
fn manual_sales_use_sku_as_name_fallback() {
    let raw = record(json!({
        "SKU": "fz5897",
        "Sale Date": "14. März 2025",
        "Status": "Sold",
        "Net Buy": "80,00",
        "Net Sale": "120,00"
    }));
    let validated = validator_for(RecordSchema::ManualSales).validate(&raw).unwrap();

    assert_eq!(validated.name, "fz5897");
    assert_eq!(validated.style_code.as_deref(), Some("FZ5897"));
    assert_eq!(validated.facts["profit"], dec("40.00"));
    assert_eq!(validated.facts["status"], "sold");
    assert_eq!(validated.facts["platform"], "Manual");
}

#[test]
fn manual_sales_reject_placeholder_sku() {
    let raw = record(json!({ "SKU": "N/A", "Sale Date": "2025-03-14", "Status": "sold" }));
    assert!(validator_for(RecordSchema::ManualSales).validate(&raw).is_err());
}
