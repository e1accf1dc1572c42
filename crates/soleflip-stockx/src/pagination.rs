//! Page walking for `StockX` list endpoints.
//!
//! Two cursor styles exist. Page-number endpoints take `pageNumber` and
//! `pageSize` and answer with `hasNextPage`:
//!
//! ```text
//! { "count": 162, "pageNumber": 2, "pageSize": 50, "hasNextPage": true, "orders": [ ... ] }
//! ```
//!
//! Continuation endpoints echo an opaque `nextCursor` to pass back as `cursor`.
//!
//! A walk stops on the first page that is shorter than requested, empty,
//! explicitly final, or missing its continuation token.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::StockxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    PageNumber,
    ContinuationToken,
}

/// Template for a paginated GET. The paginator adds the cursor parameters.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Key of the item array in each page body (`orders`, `listings`, ...).
    pub items_key: String,
    pub style: PaginationStyle,
}

impl PageRequest {
    #[must_use]
    pub fn new(path: impl Into<String>, items_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            items_key: items_key.into(),
            style: PaginationStyle::PageNumber,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: PaginationStyle) -> Self {
        self.style = style;
        self
    }

    /// Adds a query parameter; `None` values are left off the URL entirely.
    #[must_use]
    pub fn param(mut self, key: &str, value: Option<impl ToString>) -> Self {
        if let Some(v) = value {
            self.query.push((key.to_owned(), v.to_string()));
        }
        self
    }
}

/// Where the walk currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Cursor {
    Page(usize),
    Token(Option<String>),
}

impl Cursor {
    pub(crate) fn start(style: PaginationStyle) -> Self {
        match style {
            PaginationStyle::PageNumber => Self::Page(1),
            PaginationStyle::ContinuationToken => Self::Token(None),
        }
    }

    pub(crate) fn query_pairs(&self, page_size: u32) -> Vec<(String, String)> {
        let mut pairs = vec![("pageSize".to_owned(), page_size.to_string())];
        match self {
            Self::Page(n) => pairs.push(("pageNumber".to_owned(), n.to_string())),
            Self::Token(Some(token)) => pairs.push(("cursor".to_owned(), token.clone())),
            Self::Token(None) => {}
        }
        pairs
    }
}

#[derive(Debug)]
pub(crate) struct Page {
    pub items: Vec<Value>,
    pub page_number: Option<usize>,
    pub has_next: Option<bool>,
    pub next_token: Option<String>,
}

/// Splits a page body into its items and paging hints.
///
/// A body without the items key is an empty page.
pub(crate) fn parse_page(body: &Value, items_key: &str, endpoint: &str) -> Result<Page, StockxError> {
    let items = match body.get(items_key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => {
            return Err(StockxError::Deserialize {
                context: format!("{endpoint}: \"{items_key}\" is not an array"),
                source: serde::de::Error::custom(format!("found {other}")),
            })
        }
    };

    Ok(Page {
        items,
        page_number: body
            .get("pageNumber")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok()),
        has_next: body.get("hasNextPage").and_then(Value::as_bool),
        next_token: body
            .get("nextCursor")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned),
    })
}

/// Decides the cursor for the next request, or `None` when the walk is done.
///
/// # Errors
///
/// Returns [`StockxError::PaginationStalled`] when the server answers a
/// page-number request with a different page, or hands back a continuation
/// token it already issued.
pub(crate) fn next_cursor(
    current: &Cursor,
    page: &Page,
    page_size: u32,
    seen_tokens: &mut HashSet<String>,
    endpoint: &str,
    pages_fetched: usize,
) -> Result<Option<Cursor>, StockxError> {
    if let (Cursor::Page(requested), Some(echoed)) = (current, page.page_number) {
        if echoed != *requested {
            return Err(StockxError::PaginationStalled {
                endpoint: endpoint.to_owned(),
                page: pages_fetched,
                reason: format!("requested page {requested}, server returned page {echoed}"),
            });
        }
    }

    let short = page.items.len() < usize::try_from(page_size).unwrap_or(usize::MAX);
    if page.items.is_empty() || short || page.has_next == Some(false) {
        return Ok(None);
    }

    match current {
        Cursor::Page(n) => Ok(Some(Cursor::Page(n + 1))),
        Cursor::Token(_) => {
            let Some(token) = page.next_token.clone() else {
                return Ok(None);
            };
            if !seen_tokens.insert(token.clone()) {
                return Err(StockxError::PaginationStalled {
                    endpoint: endpoint.to_owned(),
                    page: pages_fetched,
                    reason: format!("continuation token \"{token}\" repeated"),
                });
            }
            Ok(Some(Cursor::Token(Some(token))))
        }
    }
}
