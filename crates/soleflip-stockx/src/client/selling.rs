//! Order, listing, and shipping-document endpoints.

use bytes::Bytes;
use serde_json::Value;

use crate::error::StockxError;
use crate::pagination::PageRequest;
use crate::types::{CreateListing, ListingCreated, Order, OrderHistoryFilter};

use super::{path_id, ApiRequest, ApiResponse, StockxClient};

impl StockxClient {
    /// All historical orders matching `filter`, across every page.
    ///
    /// Orders are returned as raw JSON so the import pipeline can audit the
    /// payload exactly as received.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_all`].
    pub async fn historical_orders(
        &self,
        filter: &OrderHistoryFilter,
    ) -> Result<Vec<Value>, StockxError> {
        let request = PageRequest::new("/selling/orders/history", "orders")
            .param("fromDate", filter.from_date.map(|d| d.format("%Y-%m-%d")))
            .param("toDate", filter.to_date.map(|d| d.format("%Y-%m-%d")))
            .param("orderStatus", filter.order_status.as_deref())
            .param("productId", filter.product_id.as_deref())
            .param("variantId", filter.variant_id.as_deref())
            .param("inventoryTypes", filter.inventory_types.as_deref());
        self.fetch_all(&request).await
    }

    /// Orders that are open (awaiting shipment, authentication, ...).
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_all`].
    pub async fn active_orders(&self) -> Result<Vec<Value>, StockxError> {
        self.fetch_all(&PageRequest::new("/selling/orders/active", "orders"))
            .await
    }

    /// # Errors
    ///
    /// See [`Self::fetch_all`].
    pub async fn list_listings(&self) -> Result<Vec<Value>, StockxError> {
        self.fetch_all(&PageRequest::new("/selling/listings", "listings"))
            .await
    }

    /// # Errors
    ///
    /// Propagates [`Self::send`] and deserialization errors.
    pub async fn get_order(&self, order_number: &str) -> Result<Option<Order>, StockxError> {
        let id = path_id("order number", order_number)?;
        self.send(&ApiRequest::get(format!("/selling/orders/{id}")))
            .await?
            .json(&format!("order {id}"))
    }

    /// Creates a listing. A 404 here is a rejection, not an absence.
    ///
    /// # Errors
    ///
    /// - [`StockxError::Rejected`] when `StockX` refuses the listing.
    /// - Anything else [`Self::send`] returns.
    pub async fn create_listing(&self, listing: &CreateListing) -> Result<ListingCreated, StockxError> {
        let body = serde_json::to_value(listing).map_err(|e| StockxError::Deserialize {
            context: "create listing request".to_owned(),
            source: e,
        })?;
        let request = ApiRequest::post_json("/selling/listings", body);
        let response = self.send(&request).await?;
        if response == ApiResponse::NotFound {
            return Err(StockxError::Rejected {
                status: 404,
                url: "/selling/listings".to_owned(),
                body: format!("variant {} not found", listing.variant_id),
            });
        }
        let created = response
            .json::<ListingCreated>("create listing response")?
            .ok_or_else(|| StockxError::Rejected {
                status: 404,
                url: "/selling/listings".to_owned(),
                body: String::new(),
            })?;
        tracing::info!(
            listing_id = %created.listing_id,
            variant_id = %listing.variant_id,
            "StockX listing created"
        );
        Ok(created)
    }

    /// Downloads a shipping label. `None` if the order or document is unknown.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::send`] errors.
    pub async fn shipping_document(
        &self,
        order_number: &str,
        shipping_id: &str,
    ) -> Result<Option<Bytes>, StockxError> {
        let order = path_id("order number", order_number)?;
        let shipping = path_id("shipping id", shipping_id)?;
        let request = ApiRequest::get(format!("/selling/orders/{order}/shipping-document/{shipping}"))
            .accept("application/pdf");
        Ok(match self.send(&request).await? {
            ApiResponse::Success { body, .. } => Some(body),
            ApiResponse::NotFound => None,
        })
    }
}
