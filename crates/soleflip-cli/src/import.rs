//! `import` subcommands: run a file through the import pipeline.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use soleflip_core::{BatchStatus, RecordSchema};
use soleflip_import::{BatchSummary, SourceDescriptor, SubmitOptions, TabularFormat};
use uuid::Uuid;

use crate::context::Context;

#[derive(Debug, Subcommand)]
pub enum ImportCommands {
    /// Import a CSV export (StockX, Alias, or a sales sheet)
    Csv {
        path: PathBuf,
        /// Record schema, e.g. stockx-export, alias-export, manual-sales
        #[arg(long)]
        schema: RecordSchema,
        /// Field delimiter; sniffed from the header when omitted
        #[arg(long)]
        delimiter: Option<char>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Import the first sheet of a spreadsheet workbook (.xlsx, .xls, .ods)
    Xlsx {
        path: PathBuf,
        #[arg(long)]
        schema: RecordSchema,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Import a JSON export (e.g. Notion pages)
    Json {
        path: PathBuf,
        #[arg(long)]
        schema: RecordSchema,
        /// Top-level field holding the record array
        #[arg(long)]
        array_field: Option<String>,
        /// Flatten nested objects into dotted keys
        #[arg(long)]
        flatten: bool,
        #[command(flatten)]
        run: RunArgs,
    },
}

/// Options shared by every command that starts a batch.
#[derive(Debug, Clone, Copy, Args)]
pub struct RunArgs {
    /// Validate and transform without writing products
    #[arg(long)]
    pub dry_run: bool,
    /// Record this batch as a retry of an earlier failed batch
    #[arg(long)]
    pub retry_of: Option<Uuid>,
}

impl From<RunArgs> for SubmitOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            dry_run: args.dry_run,
            retry_of: args.retry_of,
        }
    }
}

pub(crate) async fn run(ctx: &Context, command: ImportCommands) -> anyhow::Result<()> {
    let (descriptor, args) = match command {
        ImportCommands::Csv {
            path,
            schema,
            delimiter,
            run,
        } => (
            SourceDescriptor::TabularFile {
                path,
                schema,
                delimiter,
                format: Some(TabularFormat::Csv),
            },
            run,
        ),
        ImportCommands::Xlsx { path, schema, run } => (
            SourceDescriptor::TabularFile {
                path,
                schema,
                delimiter: None,
                format: Some(TabularFormat::Xlsx),
            },
            run,
        ),
        ImportCommands::Json {
            path,
            schema,
            array_field,
            flatten,
            run,
        } => (
            SourceDescriptor::StructuredFile {
                path,
                schema,
                array_field,
                flatten,
            },
            run,
        ),
    };
    run_batch(ctx, descriptor, args).await
}

/// Runs one batch in the foreground and reports its outcome.
///
/// # Errors
///
/// Returns an error if the batch cannot be created or ends `failed`.
pub(crate) async fn run_batch(
    ctx: &Context,
    descriptor: SourceDescriptor,
    args: RunArgs,
) -> anyhow::Result<()> {
    let summary = ctx.service.run(descriptor, args.into()).await?;
    print_summary(&summary, args.dry_run);
    if summary.status == BatchStatus::Failed {
        anyhow::bail!(
            "batch {} failed: {}",
            summary.batch_id,
            summary.last_error.as_deref().unwrap_or("no reason recorded")
        );
    }
    Ok(())
}

pub(crate) fn print_summary(summary: &BatchSummary, dry_run: bool) {
    let c = summary.counts;
    println!(
        "batch {}{}: {} (total {}, processed {}, skipped {}, errors {})",
        summary.batch_id,
        if dry_run { " [dry-run]" } else { "" },
        summary.status,
        c.total,
        c.processed,
        c.skipped,
        c.errors
    );
    if let Some(error) = &summary.last_error {
        println!("  last error: {error}");
    }
}
