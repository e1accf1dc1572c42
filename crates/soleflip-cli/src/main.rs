mod batch;
mod context;
mod import;
mod sync;
mod token;

use clap::{Parser, Subcommand};

use crate::batch::BatchCommands;
use crate::context::Context;
use crate::import::ImportCommands;
use crate::sync::SyncCommands;
use crate::token::TokenCommands;

#[derive(Debug, Parser)]
#[command(name = "soleflip")]
#[command(about = "StockX sync and sales import tooling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Import sales and inventory files
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Pull data from the `StockX` API
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect and retry import batches
    Batch {
        #[command(subcommand)]
        command: BatchCommands,
    },
    /// `StockX` OAuth token utilities
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("soleflip: no command given, see --help");
        return Ok(());
    };
    if let Commands::Token {
        command: TokenCommands::GenerateKey,
    } = command
    {
        token::generate_key();
        return Ok(());
    }

    let config = soleflip_core::load_app_config()?;
    context::init_tracing(&config)?;
    let ctx = Context::connect(config).await?;

    let result = dispatch(&ctx, command).await;
    ctx.shutdown().await;
    result
}

/// Runs one command. Every outcome returns here so `main` can drain the
/// context afterwards.
async fn dispatch(ctx: &Context, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            soleflip_db::health_check(&ctx.pool).await?;
            println!("database: ok");
            Ok(())
        }
        // Migrations already ran during connect.
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            println!("migrations: up to date");
            Ok(())
        }
        Commands::Import { command } => import::run(ctx, command).await,
        Commands::Sync { command } => sync::run(ctx, command).await,
        Commands::Batch { command } => batch::run(ctx, command).await,
        Commands::Token { command } => token::run(ctx, command).await,
    }
}

#[cfg(test)]
mod tests;
