//! Catalog and market-data endpoints.

use crate::error::StockxError;
use crate::types::{CatalogProduct, CatalogSearchPage, ProductVariant, VariantMarketData};

use super::{path_id, ApiRequest, StockxClient};

impl StockxClient {
    /// Searches the catalog. Returns a single page; callers choose which.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::send`] and deserialization errors.
    pub async fn search_catalog(
        &self,
        query: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<CatalogSearchPage, StockxError> {
        let request = ApiRequest::get("/catalog/search")
            .query("query", query)
            .query("pageNumber", page_number.max(1))
            .query("pageSize", page_size.max(1));
        let page = self
            .send(&request)
            .await?
            .json::<CatalogSearchPage>(&format!("catalog search \"{query}\""))?;
        Ok(page.unwrap_or_default())
    }

    /// Fetches one product. `None` when `StockX` does not know the id.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::send`] and deserialization errors.
    pub async fn get_product(&self, product_id: &str) -> Result<Option<CatalogProduct>, StockxError> {
        let id = path_id("product id", product_id)?;
        self.send(&ApiRequest::get(format!("/catalog/products/{id}")))
            .await?
            .json(&format!("product {id}"))
    }

    /// Lists a product's variants (sizes). Unknown products have none.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::send`] and deserialization errors.
    pub async fn get_product_variants(
        &self,
        product_id: &str,
    ) -> Result<Vec<ProductVariant>, StockxError> {
        let id = path_id("product id", product_id)?;
        let variants = self
            .send(&ApiRequest::get(format!("/catalog/products/{id}/variants")))
            .await?
            .json::<Vec<ProductVariant>>(&format!("variants of product {id}"))?;
        Ok(variants.unwrap_or_default())
    }

    /// Current bid/ask figures for every variant of a product.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::send`] and deserialization errors.
    pub async fn get_market_data(
        &self,
        product_id: &str,
        currency_code: &str,
    ) -> Result<Option<Vec<VariantMarketData>>, StockxError> {
        let id = path_id("product id", product_id)?;
        let request = ApiRequest::get(format!("/catalog/products/{id}/market-data"))
            .query("currencyCode", currency_code);
        self.send(&request)
            .await?
            .json(&format!("market data for product {id}"))
    }
}
