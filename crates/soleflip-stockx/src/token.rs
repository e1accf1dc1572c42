//! OAuth2 access-token lifecycle for the `StockX` API.
//!
//! Validity checks are plain reads of the cached token. Only the refresh
//! path is serialized: callers that find the token stale queue on the
//! refresh lock, and whoever gets there second re-checks the cache before
//! calling the token endpoint, so one expiry produces one refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use soleflip_core::StockxCredentialConfig;

use crate::error::StockxError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3_600;

/// Long-lived credentials used to mint access tokens.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub api_key: String,
}

impl OAuthCredentials {
    /// Extracts a complete credential set from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StockxError::MissingCredential`] naming the first absent value.
    pub fn from_config(cfg: &StockxCredentialConfig) -> Result<Self, StockxError> {
        fn take(v: Option<&String>, name: &'static str) -> Result<String, StockxError> {
            v.filter(|s| !s.trim().is_empty())
                .cloned()
                .ok_or(StockxError::MissingCredential(name))
        }
        Ok(Self {
            client_id: take(cfg.client_id.as_ref(), "client_id")?,
            client_secret: take(cfg.client_secret.as_ref(), "client_secret")?,
            refresh_token: take(cfg.refresh_token.as_ref(), "refresh_token")?,
            api_key: take(cfg.api_key.as_ref(), "api_key")?,
        })
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("api_key", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
    expires_at_utc: DateTime<Utc>,
}

impl AccessToken {
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.value
    }

    /// Wall-clock expiry, for display.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at_utc
    }

    fn is_fresh(&self, margin: Duration) -> bool {
        Instant::now() + margin < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("expires_at", &self.expires_at_utc)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct TokenManager {
    http: Client,
    auth_url: Url,
    client_id: String,
    client_secret: String,
    refresh_token: RwLock<String>,
    current: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
    margin: Duration,
    retry: RetryPolicy,
    refreshes: AtomicU64,
}

impl TokenManager {
    /// # Errors
    ///
    /// Returns [`StockxError::InvalidUrl`] if `auth_url` does not parse.
    pub fn new(
        http: Client,
        auth_url: &str,
        credentials: &OAuthCredentials,
        margin: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, StockxError> {
        let auth_url = Url::parse(auth_url).map_err(|e| StockxError::InvalidUrl {
            url: auth_url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            http,
            auth_url,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: RwLock::new(credentials.refresh_token.clone()),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            margin,
            retry,
            refreshes: AtomicU64::new(0),
        })
    }

    /// Returns a token that stays valid for at least the configured margin.
    ///
    /// No network I/O happens while the cached token is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`StockxError::Authentication`] if a needed refresh fails.
    pub async fn valid_token(&self) -> Result<AccessToken, StockxError> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }
        self.refresh_locked().await
    }

    /// Replaces a token the API has just rejected.
    ///
    /// If another task already swapped in a different token while this one
    /// waited for the lock, that token is returned without another refresh.
    ///
    /// # Errors
    ///
    /// Returns [`StockxError::Authentication`] if the refresh fails.
    pub async fn force_refresh(&self, rejected: &str) -> Result<AccessToken, StockxError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached() {
            if token.value != rejected {
                return Ok(token);
            }
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.refresh_locked().await
    }

    /// The refresh token currently in use. Differs from the configured one
    /// once the token endpoint has rotated it.
    #[must_use]
    pub fn current_refresh_token(&self) -> String {
        self.refresh_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful refresh calls made so far.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    fn fresh_cached(&self) -> Option<AccessToken> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|t| t.is_fresh(self.margin))
            .cloned()
    }

    async fn refresh_locked(&self) -> Result<AccessToken, StockxError> {
        let refresh_token = self.current_refresh_token();

        let response = retry_with_backoff(self.retry, "StockX token refresh", || {
            self.request_token(&refresh_token)
        })
        .await
        .map_err(|e| match e {
            StockxError::Authentication(_) => e,
            other => StockxError::Authentication(format!("token refresh failed: {other}")),
        })?;

        if let Some(rotated) = response
            .refresh_token
            .filter(|t| !t.is_empty() && *t != refresh_token)
        {
            *self
                .refresh_token
                .write()
                .unwrap_or_else(PoisonError::into_inner) = rotated;
            tracing::info!("StockX refresh token rotated by token endpoint");
        }

        let expires_in_secs = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let lifetime = Duration::from_secs(expires_in_secs);
        let token = AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + lifetime,
            expires_at_utc: Utc::now()
                + chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::zero()),
        };

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(expires_in_secs, "StockX access token refreshed");
        Ok(token)
    }

    async fn request_token(&self, refresh_token: &str) -> Result<TokenResponse, StockxError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.auth_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let status = response.status();

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(StockxError::Transient {
                url: self.auth_url.to_string(),
                attempts: 1,
                reason: format!("token endpoint returned HTTP {}", status.as_u16()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StockxError::Authentication(format!(
                "token endpoint returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str::<TokenResponse>(&body).map_err(|e| StockxError::Deserialize {
            context: "OAuth token response".to_owned(),
            source: e,
        })
    }
}
