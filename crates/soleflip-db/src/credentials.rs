//! `StockX` credentials kept encrypted in `system_config`.
//!
//! Values are Fernet tokens keyed by `FIELD_ENCRYPTION_KEY`; plaintext never
//! reaches the table.

use fernet::Fernet;
use soleflip_core::StockxCredentialConfig;
use sqlx::PgPool;

use crate::DbError;

pub const CLIENT_ID_KEY: &str = "stockx_client_id";
pub const CLIENT_SECRET_KEY: &str = "stockx_client_secret";
pub const REFRESH_TOKEN_KEY: &str = "stockx_refresh_token";
pub const API_KEY_KEY: &str = "stockx_api_key";

pub const CREDENTIAL_KEYS: [&str; 4] = [CLIENT_ID_KEY, CLIENT_SECRET_KEY, REFRESH_TOKEN_KEY, API_KEY_KEY];

/// Encrypts and decrypts `system_config` values.
#[derive(Clone)]
pub struct CredentialCipher {
    fernet: Fernet,
}

impl CredentialCipher {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidEncryptionKey`] unless `key` is 32 bytes of
    /// URL-safe base64.
    pub fn new(key: &str) -> Result<Self, DbError> {
        Fernet::new(key.trim())
            .map(|fernet| Self { fernet })
            .ok_or(DbError::InvalidEncryptionKey)
    }

    /// A fresh random key in the format [`CredentialCipher::new`] accepts.
    #[must_use]
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }

    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> String {
        self.fernet.encrypt(plaintext.as_bytes())
    }

    /// Decrypts the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CredentialDecrypt`] when the token was written with
    /// another key, is corrupt, or does not hold UTF-8.
    pub fn decrypt(&self, key: &str, token: &str) -> Result<String, DbError> {
        let undecryptable = || DbError::CredentialDecrypt { key: key.to_owned() };
        let bytes = self.fernet.decrypt(token.trim()).map_err(|_| undecryptable())?;
        String::from_utf8(bytes).map_err(|_| undecryptable())
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

/// Reads the four credential values, preferring stored values over those in
/// `fallback` (usually the environment). Blank stored values count as absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure and
/// [`DbError::CredentialDecrypt`] when a stored value does not decrypt with
/// `cipher`.
pub async fn load_stockx_credentials(
    pool: &PgPool,
    cipher: &CredentialCipher,
    fallback: &StockxCredentialConfig,
) -> Result<StockxCredentialConfig, DbError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT key, value_encrypted FROM system_config WHERE key = ANY($1)",
    )
    .bind(CREDENTIAL_KEYS.as_slice())
    .fetch_all(pool)
    .await?;

    merge_stored(&rows, cipher, fallback)
}

fn merge_stored(
    rows: &[(String, String)],
    cipher: &CredentialCipher,
    fallback: &StockxCredentialConfig,
) -> Result<StockxCredentialConfig, DbError> {
    let stored = |key: &str| -> Result<Option<String>, DbError> {
        let Some((_, token)) = rows.iter().find(|(k, _)| k == key) else {
            return Ok(None);
        };
        let value = cipher.decrypt(key, token)?;
        Ok(Some(value.trim().to_owned()).filter(|v| !v.is_empty()))
    };

    Ok(StockxCredentialConfig {
        client_id: stored(CLIENT_ID_KEY)?.or_else(|| fallback.client_id.clone()),
        client_secret: stored(CLIENT_SECRET_KEY)?.or_else(|| fallback.client_secret.clone()),
        refresh_token: stored(REFRESH_TOKEN_KEY)?.or_else(|| fallback.refresh_token.clone()),
        api_key: stored(API_KEY_KEY)?.or_else(|| fallback.api_key.clone()),
    })
}

/// Encrypts `value` and upserts it under `key`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn store_credential(
    pool: &PgPool,
    cipher: &CredentialCipher,
    key: &str,
    value: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO system_config (key, value_encrypted) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value_encrypted = EXCLUDED.value_encrypted, updated_at = NOW()",
    )
    .bind(key)
    .bind(cipher.encrypt(value))
    .execute(pool)
    .await?;

    Ok(())
}

/// Persists a rotated refresh token. This is the only credential write the
/// client itself makes.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn store_refresh_token(
    pool: &PgPool,
    cipher: &CredentialCipher,
    refresh_token: &str,
) -> Result<(), DbError> {
    store_credential(pool, cipher, REFRESH_TOKEN_KEY, refresh_token).await
}
