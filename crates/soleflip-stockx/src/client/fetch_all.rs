//! Multi-page fetch loop for `StockxClient`.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StockxError;
use crate::pagination::{next_cursor, parse_page, Cursor, PageRequest};

use super::{ApiRequest, StockxClient};

impl StockxClient {
    /// Walks every page of `request` with the configured page size and
    /// returns the items of all pages, in order.
    ///
    /// An empty first page (or a 404 from the list endpoint) yields an empty
    /// `Vec`. Any failing page discards what was already collected.
    ///
    /// # Errors
    ///
    /// - [`StockxError::PaginationLimit`] past the configured page ceiling.
    /// - [`StockxError::PaginationStalled`] when the server repeats a page
    ///   or cursor.
    /// - [`StockxError::Deserialize`] if a page or item does not parse.
    /// - Anything [`Self::send`] returns.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
    ) -> Result<Vec<T>, StockxError> {
        self.fetch_all_with_page_size(request, self.page_size).await
    }

    /// [`Self::fetch_all`] with an explicit page size hint.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_all`].
    pub async fn fetch_all_with_page_size<T: DeserializeOwned>(
        &self,
        request: &PageRequest,
        page_size: u32,
    ) -> Result<Vec<T>, StockxError> {
        let page_size = page_size.max(1);
        let endpoint = request.path.as_str();
        let mut records: Vec<T> = Vec::new();
        let mut cursor = Cursor::start(request.style);
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;

        loop {
            pages += 1;
            if pages > self.max_pages {
                return Err(StockxError::PaginationLimit {
                    endpoint: endpoint.to_owned(),
                    max_pages: self.max_pages,
                });
            }

            let api_request = ApiRequest::get(endpoint)
                .extend_query(request.query.iter().cloned())
                .extend_query(cursor.query_pairs(page_size));

            let context = format!("{endpoint} page {pages}");
            let Some(body) = self.send(&api_request).await?.json::<Value>(&context)? else {
                tracing::debug!(endpoint, page = pages, "list endpoint returned 404, treating as end");
                break;
            };

            let page = parse_page(&body, &request.items_key, endpoint)?;
            let next = next_cursor(&cursor, &page, page_size, &mut seen_tokens, endpoint, pages)?;

            let item_count = page.items.len();
            for (index, item) in page.items.into_iter().enumerate() {
                let record = serde_json::from_value(item).map_err(|e| StockxError::Deserialize {
                    context: format!("{context} item {index}"),
                    source: e,
                })?;
                records.push(record);
            }
            tracing::debug!(endpoint, page = pages, items = item_count, "fetched page");

            match next {
                Some(c) => cursor = c,
                None => break,
            }
        }

        tracing::info!(endpoint, pages, records = records.len(), "pagination complete");
        Ok(records)
    }
}

