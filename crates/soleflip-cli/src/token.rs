use std::io::BufRead;

use clap::{Subcommand, ValueEnum};
use soleflip_db::credentials::{API_KEY_KEY, CLIENT_ID_KEY, CLIENT_SECRET_KEY, REFRESH_TOKEN_KEY};
use soleflip_db::CredentialCipher;

use crate::context::Context;

#[derive(Debug, Subcommand)]
pub enum TokenCommands {
    /// Obtain an access token and print its expiry
    Check,
    /// Print a new FIELD_ENCRYPTION_KEY (needs no database)
    GenerateKey,
    /// Encrypt a StockX credential into system_config
    Set {
        name: CredentialName,
        /// Read from the first line of stdin when omitted
        value: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialName {
    ClientId,
    ClientSecret,
    RefreshToken,
    ApiKey,
}

impl CredentialName {
    fn key(self) -> &'static str {
        match self {
            Self::ClientId => CLIENT_ID_KEY,
            Self::ClientSecret => CLIENT_SECRET_KEY,
            Self::RefreshToken => REFRESH_TOKEN_KEY,
            Self::ApiKey => API_KEY_KEY,
        }
    }
}

pub(crate) fn generate_key() {
    println!("{}", CredentialCipher::generate_key());
}

pub(crate) async fn run(ctx: &Context, command: TokenCommands) -> anyhow::Result<()> {
    match command {
        TokenCommands::Check => {
            let client = ctx.require_client()?;
            let token = client.tokens().valid_token().await?;
            println!(
                "token from {}: valid until {} ({} refresh(es) this session)",
                ctx.config.stockx_auth_url,
                token.expires_at().format("%Y-%m-%d %H:%M:%S UTC"),
                client.tokens().refresh_count()
            );
            Ok(())
        }
        TokenCommands::GenerateKey => {
            generate_key();
            Ok(())
        }
        TokenCommands::Set { name, value } => {
            let cipher = ctx.require_cipher()?;
            let value = match value {
                Some(value) => value,
                None => {
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                    line
                }
            };
            let value = value.trim();
            if value.is_empty() {
                anyhow::bail!("refusing to store a blank {}", name.key());
            }
            soleflip_db::store_credential(&ctx.pool, cipher, name.key(), value).await?;
            println!("{}: stored (encrypted)", name.key());
            Ok(())
        }
    }
}
