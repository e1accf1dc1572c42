#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// `StockX` OAuth2 client credentials as supplied through the environment.
///
/// Every field is optional at load time: file imports never talk to the
/// marketplace, so only live operations demand a complete set.
#[derive(Clone, Default)]
pub struct StockxCredentialConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub api_key: Option<String>,
}

impl StockxCredentialConfig {
    /// Returns `true` when all four values are present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
            &self.api_key,
        ]
        .iter()
        .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

impl std::fmt::Debug for StockxCredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("StockxCredentialConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub stockx_api_base_url: String,
    pub stockx_auth_url: String,
    pub stockx_credentials: StockxCredentialConfig,
    /// Fernet key for the credentials kept in `system_config`. Without it
    /// only the environment credentials are used.
    pub field_encryption_key: Option<String>,
    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
    /// Upper bound on concurrently open requests to the marketplace.
    pub http_max_connections: usize,
    pub http_max_idle_per_host: usize,
    pub http_idle_timeout_secs: u64,
    pub http_user_agent: String,
    pub http_max_retries: u32,
    pub http_backoff_base_ms: u64,
    pub rate_limit_capacity: u32,
    pub rate_limit_period_ms: u64,
    /// Wait used when a 429 arrives without a usable `Retry-After` header.
    pub throttle_fallback_wait_secs: u64,
    /// Consecutive 429 waits tolerated for one request before giving up.
    pub throttle_max_waits: u32,
    pub token_refresh_margin_secs: u64,
    pub page_size: u32,
    pub max_pages: usize,
    pub import_max_concurrent_batches: usize,
    /// Error ratio (0.0..=1.0) above which a running batch is aborted.
    pub import_abort_error_rate: f64,
    /// Records that must be seen before the abort ratio is evaluated.
    pub import_abort_min_records: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("stockx_api_base_url", &self.stockx_api_base_url)
            .field("stockx_auth_url", &self.stockx_auth_url)
            .field("stockx_credentials", &self.stockx_credentials)
            .field(
                "field_encryption_key",
                &self.field_encryption_key.as_ref().map(|_| "[redacted]"),
            )
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("http_connect_timeout_secs", &self.http_connect_timeout_secs)
            .field("http_max_connections", &self.http_max_connections)
            .field("http_max_idle_per_host", &self.http_max_idle_per_host)
            .field("http_idle_timeout_secs", &self.http_idle_timeout_secs)
            .field("http_user_agent", &self.http_user_agent)
            .field("http_max_retries", &self.http_max_retries)
            .field("http_backoff_base_ms", &self.http_backoff_base_ms)
            .field("rate_limit_capacity", &self.rate_limit_capacity)
            .field("rate_limit_period_ms", &self.rate_limit_period_ms)
            .field(
                "throttle_fallback_wait_secs",
                &self.throttle_fallback_wait_secs,
            )
            .field("throttle_max_waits", &self.throttle_max_waits)
            .field("token_refresh_margin_secs", &self.token_refresh_margin_secs)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field(
                "import_max_concurrent_batches",
                &self.import_max_concurrent_batches,
            )
            .field("import_abort_error_rate", &self.import_abort_error_rate)
            .field("import_abort_min_records", &self.import_abort_min_records)
            .finish()
    }
}
