//! `StockX` API v2 request and response shapes.
//!
//! Field names follow the API's camelCase. Monetary amounts arrive as
//! decimal strings (`"125.00"`) and are kept as [`Decimal`]. Anything the
//! import pipeline reads generically stays a `serde_json::Value`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub product_id: String,
    #[serde(default)]
    pub url_key: Option<String>,
    #[serde(default)]
    pub style_id: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub product_attributes: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSearchPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub products: Vec<CatalogProduct>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub product_id: String,
    pub variant_id: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(default)]
    pub variant_value: Option<String>,
}

/// Bid/ask snapshot for one variant.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantMarketData {
    pub product_id: String,
    pub variant_id: String,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub lowest_ask_amount: Option<Decimal>,
    #[serde(default)]
    pub highest_bid_amount: Option<Decimal>,
    #[serde(default)]
    pub sell_faster_amount: Option<Decimal>,
    #[serde(default)]
    pub earn_more_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderProduct {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub style_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderVariant {
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub variant_value: Option<String>,
}

/// A single order as returned by the order-detail endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_number: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub product: Option<OrderProduct>,
    #[serde(default)]
    pub variant: Option<OrderVariant>,
}

/// Filters for the historical order listing. `None` fields are omitted
/// from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderHistoryFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub order_status: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub inventory_types: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateListing {
    pub variant_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency_code: String,
    pub active: bool,
    pub inventory_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateListing {
    /// An active standard-inventory listing priced in USD.
    #[must_use]
    pub fn new(variant_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            variant_id: variant_id.into(),
            amount,
            currency_code: "USD".to_owned(),
            active: true,
            inventory_type: "STANDARD".to_owned(),
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingCreated {
    pub listing_id: String,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub operation_status: Option<String>,
}
