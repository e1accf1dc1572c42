//! Resilient HTTP client for the `StockX` API v2.
//!
//! Every request passes, in order, through the shared [`RateLimiter`], the
//! [`TokenManager`], and an in-flight permit bounding concurrent connections.
//! Responses are then sorted into one of four outcomes:
//!
//! | Response | Handling |
//! |---|---|
//! | 2xx | returned |
//! | 404 | [`ApiResponse::NotFound`] |
//! | 401 | token force-refreshed, request retried once |
//! | 429 | cooperative wait for `Retry-After`, own counter |
//! | 5xx, timeout, connect error | jittered back-off, retry budget |
//! | other 4xx | [`StockxError::Rejected`] |

mod catalog;
mod fetch_all;
mod retry_after;
mod selling;

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use soleflip_core::AppConfig;

use crate::error::StockxError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::token::{AccessToken, OAuthCredentials, TokenManager};

/// Tunables for [`StockxClient`]. [`Default`] carries production values.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub auth_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub rate_limit_capacity: u32,
    pub rate_limit_period: Duration,
    pub throttle_fallback_wait: Duration,
    pub throttle_max_waits: u32,
    pub token_refresh_margin: Duration,
    pub page_size: u32,
    pub max_pages: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.stockx.com/v2".to_owned(),
            auth_url: "https://accounts.stockx.com/oauth/token".to_owned(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_connections: 16,
            max_idle_per_host: 8,
            idle_timeout: Duration::from_secs(90),
            user_agent: "soleflip/0.1 (reseller-sync)".to_owned(),
            retry: RetryPolicy::new(3, 500),
            rate_limit_capacity: 10,
            rate_limit_period: Duration::from_secs(1),
            throttle_fallback_wait: Duration::from_secs(60),
            throttle_max_waits: 10,
            token_refresh_margin: Duration::from_secs(60),
            page_size: 100,
            max_pages: 500,
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.stockx_api_base_url.clone(),
            auth_url: cfg.stockx_auth_url.clone(),
            timeout: Duration::from_secs(cfg.http_timeout_secs),
            connect_timeout: Duration::from_secs(cfg.http_connect_timeout_secs),
            max_connections: cfg.http_max_connections,
            max_idle_per_host: cfg.http_max_idle_per_host,
            idle_timeout: Duration::from_secs(cfg.http_idle_timeout_secs),
            user_agent: cfg.http_user_agent.clone(),
            retry: RetryPolicy::new(cfg.http_max_retries, cfg.http_backoff_base_ms),
            rate_limit_capacity: cfg.rate_limit_capacity,
            rate_limit_period: Duration::from_millis(cfg.rate_limit_period_ms),
            throttle_fallback_wait: Duration::from_secs(cfg.throttle_fallback_wait_secs),
            throttle_max_waits: cfg.throttle_max_waits,
            token_refresh_margin: Duration::from_secs(cfg.token_refresh_margin_secs),
            page_size: cfg.page_size,
            max_pages: cfg.max_pages,
        }
    }
}

/// One logical API call, replayable across retries.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    json: Option<serde_json::Value>,
    accept: &'static str,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            json: None,
            accept: "application/json",
        }
    }

    #[must_use]
    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            json: Some(body),
            ..Self::get(path)
        }
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    #[must_use]
    pub fn extend_query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    #[must_use]
    pub fn accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    Success { status: StatusCode, body: Bytes },
    NotFound,
}

impl ApiResponse {
    /// Decodes a JSON body. `NotFound` becomes `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StockxError::Deserialize`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self, context: &str) -> Result<Option<T>, StockxError> {
        match self {
            Self::NotFound => Ok(None),
            Self::Success { body, .. } => serde_json::from_slice(&body).map(Some).map_err(|e| {
                StockxError::Deserialize {
                    context: context.to_owned(),
                    source: e,
                }
            }),
        }
    }
}

/// Result of a single wire attempt, before any waiting.
enum Attempt {
    Done(ApiResponse),
    Unauthorized,
    Throttled(Option<Duration>),
    Retryable(String),
}

/// Shared, long-lived `StockX` client.
///
/// Construct once per process and share by reference (or `Arc`); the rate
/// limit and connection bound are only global if every caller goes through
/// the same instance.
pub struct StockxClient {
    http: Client,
    base_url: String,
    api_key: String,
    tokens: TokenManager,
    limiter: RateLimiter,
    in_flight: Semaphore,
    max_in_flight: u32,
    retry: RetryPolicy,
    throttle_fallback_wait: Duration,
    throttle_max_waits: u32,
    page_size: u32,
    max_pages: usize,
}

impl StockxClient {
    /// Builds the pooled transport, token manager, and rate limiter.
    ///
    /// # Errors
    ///
    /// - [`StockxError::Http`] if the `reqwest::Client` cannot be built.
    /// - [`StockxError::InvalidUrl`] if the base or auth URL does not parse.
    pub fn new(settings: ClientSettings, credentials: &OAuthCredentials) -> Result<Self, StockxError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_max_idle_per_host(settings.max_idle_per_host)
            .pool_idle_timeout(settings.idle_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()?;

        let base_url = settings.base_url.trim_end_matches('/').to_owned();
        Url::parse(&base_url).map_err(|e| StockxError::InvalidUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;

        let tokens = TokenManager::new(
            http.clone(),
            &settings.auth_url,
            credentials,
            settings.token_refresh_margin,
            settings.retry,
        )?;

        let max_in_flight = u32::try_from(settings.max_connections.max(1)).unwrap_or(u32::MAX);

        Ok(Self {
            http,
            base_url,
            api_key: credentials.api_key.clone(),
            tokens,
            limiter: RateLimiter::new(settings.rate_limit_capacity, settings.rate_limit_period),
            in_flight: Semaphore::new(max_in_flight as usize),
            max_in_flight,
            retry: settings.retry,
            throttle_fallback_wait: settings.throttle_fallback_wait,
            throttle_max_waits: settings.throttle_max_waits,
            page_size: settings.page_size.max(1),
            max_pages: settings.max_pages,
        })
    }

    /// Builds a client from configuration with credentials taken from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`StockxError::MissingCredential`] when the environment lacks a
    /// credential, or any error from [`Self::new`].
    pub fn from_app_config(cfg: &AppConfig) -> Result<Self, StockxError> {
        let credentials = OAuthCredentials::from_config(&cfg.stockx_credentials)?;
        Self::new(ClientSettings::from_app_config(cfg), &credentials)
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Sends `request`, absorbing throttling, one stale token, and transient
    /// failures up to the retry budget.
    ///
    /// # Errors
    ///
    /// - [`StockxError::Authentication`] if the token cannot be refreshed or
    ///   is rejected again right after a refresh.
    /// - [`StockxError::Transient`] once the back-off budget is spent.
    /// - [`StockxError::ThrottleLimit`] after too many consecutive 429s.
    /// - [`StockxError::Rejected`] for other 4xx responses.
    /// - [`StockxError::ShutDown`] after [`Self::shutdown`].
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StockxError> {
        if self.in_flight.is_closed() {
            return Err(StockxError::ShutDown);
        }
        let url = self.url_for(&request.path, &request.query)?;

        let mut failures = 0u32;
        let mut throttle_waits = 0u32;
        let mut reauthenticated = false;

        loop {
            self.limiter.acquire().await;
            let token = self.tokens.valid_token().await?;

            match self.attempt(request, &url, &token).await? {
                Attempt::Done(response) => return Ok(response),
                Attempt::Unauthorized => {
                    if reauthenticated {
                        return Err(StockxError::Authentication(format!(
                            "{url} rejected a freshly refreshed token"
                        )));
                    }
                    reauthenticated = true;
                    tracing::warn!(url = %url, "StockX returned 401, forcing token refresh");
                    self.tokens.force_refresh(token.secret()).await?;
                }
                Attempt::Throttled(advised) => {
                    if throttle_waits >= self.throttle_max_waits {
                        return Err(StockxError::ThrottleLimit {
                            url: url.to_string(),
                            waits: throttle_waits,
                        });
                    }
                    throttle_waits += 1;
                    let wait = advised.unwrap_or(self.throttle_fallback_wait);
                    tracing::warn!(
                        url = %url,
                        throttle_waits,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        advised = advised.is_some(),
                        "StockX throttled request, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Attempt::Retryable(reason) => {
                    failures += 1;
                    if failures > self.retry.max_retries {
                        return Err(StockxError::Transient {
                            url: url.to_string(),
                            attempts: failures,
                            reason,
                        });
                    }
                    let delay = self.retry.delay_for(failures);
                    tracing::warn!(
                        url = %url,
                        attempt = failures,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        reason = %reason,
                        "StockX transient error, retrying after back-off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Waits for in-flight requests to finish, then refuses new ones.
    pub async fn shutdown(&self) {
        if self.in_flight.is_closed() {
            return;
        }
        if let Ok(drained) = self.in_flight.acquire_many(self.max_in_flight).await {
            self.in_flight.close();
            drop(drained);
        }
        tracing::info!("StockX client drained and closed");
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &Url,
        token: &AccessToken,
    ) -> Result<Attempt, StockxError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| StockxError::ShutDown)?;

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .bearer_auth(token.secret())
            .header("x-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, request.accept);
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(StockxError::Http(e)),
            Err(e) => return Ok(Attempt::Retryable(e.to_string())),
        };
        let status = response.status();

        if status.is_success() {
            return Ok(match response.bytes().await {
                Ok(body) => Attempt::Done(ApiResponse::Success { status, body }),
                Err(e) => Attempt::Retryable(format!("reading response body: {e}")),
            });
        }

        Ok(match status {
            StatusCode::NOT_FOUND => Attempt::Done(ApiResponse::NotFound),
            StatusCode::UNAUTHORIZED => Attempt::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Attempt::Throttled(retry_after::parse(
                response.headers(),
                chrono::Utc::now(),
            )),
            s if s.is_server_error() => Attempt::Retryable(format!("HTTP {}", s.as_u16())),
            s => {
                let body = response.text().await.unwrap_or_default();
                return Err(StockxError::Rejected {
                    status: s.as_u16(),
                    url: url.to_string(),
                    body,
                });
            }
        })
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url, StockxError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| StockxError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

/// Rejects identifiers that would change the request path.
pub(crate) fn path_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, StockxError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
    {
        return Err(StockxError::InvalidUrl {
            url: id.to_owned(),
            reason: format!("{kind} is not a valid path segment"),
        });
    }
    Ok(trimmed)
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
