use thiserror::Error;

/// Errors returned by the `StockX` marketplace client.
#[derive(Debug, Error)]
pub enum StockxError {
    /// The underlying `reqwest::Client` could not be built, or a request
    /// failed in a way that is not worth retrying (e.g. a malformed request).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The OAuth2 refresh failed, or the API kept rejecting the token after
    /// a forced refresh.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// 5xx responses, timeouts, or connection failures outlasted the retry budget.
    #[error("transient failure for {url} after {attempts} attempts: {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// A non-retryable 4xx response.
    #[error("request to {url} rejected with HTTP {status}: {body}")]
    Rejected {
        status: u16,
        url: String,
        body: String,
    },

    /// The server kept answering 429 past the configured number of waits.
    #[error("still throttled by {url} after {waits} cooperative waits")]
    ThrottleLimit { url: String, waits: u32 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("pagination limit reached for {endpoint}: exceeded {max_pages} pages")]
    PaginationLimit { endpoint: String, max_pages: usize },

    /// The server handed back a cursor or page it already served.
    #[error("pagination stalled on {endpoint} at page {page}: {reason}")]
    PaginationStalled {
        endpoint: String,
        page: usize,
        reason: String,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("missing StockX credential: {0}")]
    MissingCredential(&'static str),

    #[error("client is shut down")]
    ShutDown,
}

impl StockxError {
    /// Whether this error came from the authentication path.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
