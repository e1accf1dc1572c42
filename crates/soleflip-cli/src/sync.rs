//! `sync` subcommands: pull from the live `StockX` API.

use chrono::NaiveDate;
use clap::Subcommand;
use soleflip_import::SourceDescriptor;

use crate::context::Context;
use crate::import::{run_batch, RunArgs};

#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Import historical orders as a live-API batch
    Orders {
        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Order status filter, e.g. COMPLETED
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
}

pub(crate) async fn run(ctx: &Context, command: SyncCommands) -> anyhow::Result<()> {
    match command {
        SyncCommands::Orders {
            from,
            to,
            status,
            run,
        } => {
            if let (Some(from), Some(to)) = (from, to) {
                if from > to {
                    anyhow::bail!("--from {from} is after --to {to}");
                }
            }
            ctx.require_client()?;
            let descriptor = SourceDescriptor::LiveOrderHistory {
                from,
                to,
                order_status: status,
            };
            run_batch(ctx, descriptor, run).await
        }
    }
}
