//! Process-wide resources shared by every command.
//!
//! Built in a fixed order (pool and migrations, decrypted credentials, `StockX`
//! client, import service) and torn down in reverse: the import service
//! drains before the client it may still be calling.

use std::sync::Arc;

use soleflip_core::AppConfig;
use soleflip_db::CredentialCipher;
use soleflip_import::{ImportService, OrderSource, PgImportStore, ServiceSettings};
use soleflip_stockx::{ClientSettings, OAuthCredentials, StockxClient, StockxError};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

/// Installs the `fmt` subscriber. `RUST_LOG` wins over the configured level.
///
/// # Errors
///
/// Returns an error if neither filter directive parses.
pub(crate) fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

pub(crate) struct Context {
    pub config: AppConfig,
    pub pool: PgPool,
    pub client: Option<Arc<StockxClient>>,
    pub service: ImportService,
    pub cipher: Option<CredentialCipher>,
    initial_refresh_token: Option<String>,
}

impl Context {
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, a migration fails,
    /// or the `StockX` client cannot be built from complete credentials.
    pub(crate) async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let pool_config = soleflip_db::PoolConfig::from_app_config(&config);
        let pool = soleflip_db::connect_pool(&config.database_url, pool_config).await?;
        let applied = soleflip_db::run_migrations(&pool).await?;
        tracing::debug!(applied, "migrations checked");

        let cipher = config
            .field_encryption_key
            .as_deref()
            .map(CredentialCipher::new)
            .transpose()?;
        let credentials = match &cipher {
            Some(cipher) => {
                soleflip_db::load_stockx_credentials(&pool, cipher, &config.stockx_credentials)
                    .await?
            }
            None => {
                tracing::debug!("FIELD_ENCRYPTION_KEY unset; using environment credentials only");
                config.stockx_credentials.clone()
            }
        };
        let client = match OAuthCredentials::from_config(&credentials) {
            Ok(oauth) => Some(Arc::new(StockxClient::new(
                ClientSettings::from_app_config(&config),
                &oauth,
            )?)),
            Err(StockxError::MissingCredential(name)) => {
                tracing::debug!(missing = name, "StockX credentials incomplete; live commands disabled");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let orders = client
            .clone()
            .map(|c| c as Arc<dyn OrderSource>);
        let service = ImportService::new(
            Arc::new(PgImportStore::new(pool.clone())),
            orders,
            ServiceSettings::from_app_config(&config),
        );
        spawn_interrupt_handler(service.clone());

        Ok(Self {
            config,
            pool,
            client,
            service,
            cipher,
            initial_refresh_token: credentials.refresh_token,
        })
    }

    /// The `StockX` client, or an error explaining what is missing.
    pub(crate) fn require_client(&self) -> anyhow::Result<&StockxClient> {
        self.client.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "StockX credentials are incomplete; set STOCKX_CLIENT_ID, STOCKX_CLIENT_SECRET, \
                 STOCKX_REFRESH_TOKEN and STOCKX_API_KEY or store them in system_config"
            )
        })
    }

    /// The credential cipher, or an error explaining how to configure it.
    pub(crate) fn require_cipher(&self) -> anyhow::Result<&CredentialCipher> {
        self.cipher.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "FIELD_ENCRYPTION_KEY is not set; create one with `soleflip token generate-key`"
            )
        })
    }

    /// Drains the import service, then the client, then persists a rotated
    /// refresh token if the token endpoint issued one.
    pub(crate) async fn shutdown(self) {
        self.service.shutdown().await;
        let Some(client) = self.client else {
            return;
        };
        client.shutdown().await;

        let current = client.tokens().current_refresh_token();
        if self.initial_refresh_token.as_deref() == Some(current.as_str()) {
            return;
        }
        let Some(cipher) = &self.cipher else {
            tracing::warn!("StockX refresh token rotated but FIELD_ENCRYPTION_KEY is unset; not persisted");
            return;
        };
        match soleflip_db::store_refresh_token(&self.pool, cipher, &current).await {
            Ok(()) => tracing::info!("rotated StockX refresh token persisted"),
            Err(e) => tracing::error!(error = %e, "failed to persist rotated StockX refresh token"),
        }
    }
}

/// Cancels every running batch on Ctrl-C. Cancelled batches end `failed`
/// with the position they reached.
fn spawn_interrupt_handler(service: ImportService) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received, cancelling running imports");
                service.cancel_all();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });
}
