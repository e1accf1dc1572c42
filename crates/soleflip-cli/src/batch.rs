//! `batch` subcommands: inspect, list, and retry import batches.
//!
//! Everything except `retry` is read-only.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use soleflip_core::RecordStatus;
use soleflip_db::ImportBatchRow;
use uuid::Uuid;

use crate::context::Context;

#[derive(Debug, Subcommand)]
pub enum BatchCommands {
    /// Show one batch with its per-status record counts
    Status { id: Uuid },
    /// List the most recent batches
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show the audit records of a batch
    Records {
        id: Uuid,
        /// Only records with this status, e.g. invalid
        #[arg(long)]
        status: Option<RecordStatus>,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Re-run the source of a failed or partially failed batch
    Retry {
        id: Uuid,
        #[arg(long)]
        dry_run: bool,
    },
    /// List unfinished batches with no progress for a while
    Stalled {
        /// Seconds without a progress write
        #[arg(long, default_value = "900")]
        idle_secs: u32,
    },
}

pub(crate) async fn run(ctx: &Context, command: BatchCommands) -> anyhow::Result<()> {
    match command {
        BatchCommands::Status { id } => run_batch_status(ctx, id).await,
        BatchCommands::List { limit } => {
            let rows = soleflip_db::list_import_batches(&ctx.pool, i64::from(limit)).await?;
            print_batch_table(&rows, "no import batches yet");
            Ok(())
        }
        BatchCommands::Records { id, status, limit } => {
            run_batch_records(ctx, id, status, limit).await
        }
        BatchCommands::Retry { id, dry_run } => run_batch_retry(ctx, id, dry_run).await,
        BatchCommands::Stalled { idle_secs } => {
            let rows = soleflip_db::list_stalled_import_batches(&ctx.pool, idle_secs).await?;
            print_batch_table(&rows, "no stalled batches");
            Ok(())
        }
    }
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "-".to_owned(),
        |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

async fn run_batch_status(ctx: &Context, id: Uuid) -> anyhow::Result<()> {
    let batch = ctx
        .service
        .status(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("batch {id} not found"))?;

    println!("batch       {}", batch.id);
    println!("source      {}", batch.source_type);
    println!(
        "status      {}{}",
        batch.status,
        if batch.dry_run { " (dry-run)" } else { "" }
    );
    println!(
        "records     total {}, processed {}, skipped {}, errors {}",
        batch.counts.total, batch.counts.processed, batch.counts.skipped, batch.counts.errors
    );
    if let Some(previous) = batch.retry_of {
        println!("retry of    {previous} (attempt {})", batch.retry_count);
    }
    println!("created     {}", fmt_time(Some(batch.created_at)));
    println!("started     {}", fmt_time(batch.started_at));
    println!("completed   {}", fmt_time(batch.completed_at));
    println!("updated     {}", fmt_time(Some(batch.updated_at)));
    if let Some(error) = &batch.last_error {
        println!("last error  {error}");
    }

    let by_status = soleflip_db::count_import_records_by_status(&ctx.pool, id).await?;
    for (status, count) in by_status {
        println!("  {status:<18}{count}");
    }
    Ok(())
}

async fn run_batch_records(
    ctx: &Context,
    id: Uuid,
    status: Option<RecordStatus>,
    limit: u32,
) -> anyhow::Result<()> {
    let records =
        soleflip_db::list_import_records(&ctx.pool, id, status, i64::from(limit)).await?;
    if records.is_empty() {
        println!("no records found for batch {id}");
        return Ok(());
    }

    println!("{:<6}{:<19}{:<28}DETAIL", "POS", "STATUS", "STABLE KEY");
    for record in &records {
        let detail = match &record.error_detail {
            Some(error) => error.clone(),
            None => serde_json::to_string(&record.raw_payload)?,
        };
        let detail = if detail.chars().count() > 80 {
            format!("{}...", detail.chars().take(80).collect::<String>())
        } else {
            detail
        };
        println!(
            "{:<6}{:<19}{:<28}{}",
            record.position,
            record.status,
            record.stable_key.as_deref().unwrap_or("-"),
            detail
        );
    }
    Ok(())
}

async fn run_batch_retry(ctx: &Context, id: Uuid, dry_run: bool) -> anyhow::Result<()> {
    let retry_id = ctx.service.retry(id, dry_run).await?;
    println!("batch {id} resubmitted as {retry_id}");
    ctx.service.shutdown().await;
    run_batch_status(ctx, retry_id).await
}

fn print_batch_table(rows: &[ImportBatchRow], empty: &str) {
    if rows.is_empty() {
        println!("{empty}");
        return;
    }
    println!(
        "{:<38}{:<17}{:<17}{:>7}{:>7}{:>7}  UPDATED",
        "BATCH", "SOURCE", "STATUS", "TOTAL", "SKIP", "ERR"
    );
    for row in rows {
        println!(
            "{:<38}{:<17}{:<17}{:>7}{:>7}{:>7}  {}",
            row.id,
            row.source_type,
            row.status,
            row.total_records,
            row.skipped_records,
            row.error_records,
            fmt_time(Some(row.updated_at))
        );
    }
}
