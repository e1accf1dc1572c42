//! Client for the `StockX` marketplace API.
//!
//! [`StockxClient`] is the single process-wide entry point: it owns the
//! pooled transport, the OAuth [`TokenManager`], and the [`RateLimiter`]
//! that every outbound request passes through.

pub mod client;
pub mod error;
pub mod pagination;
pub mod rate_limit;
pub mod retry;
pub mod token;
pub mod types;

pub use client::{ApiRequest, ApiResponse, ClientSettings, StockxClient};
pub use error::StockxError;
pub use pagination::{PageRequest, PaginationStyle};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use token::{AccessToken, OAuthCredentials, TokenManager};
pub use types::{
    CatalogProduct, CatalogSearchPage, CreateListing, ListingCreated, Order, OrderHistoryFilter,
    ProductVariant, VariantMarketData,
};
