use std::sync::Arc;

use donorbridge::source::DonationId;
use donorbridge::sync::{
    BackfillConfig, BackfillOverview, BackfillSummary, ExcludedStatus, PREVIEW_BATCH_SIZE,
    PreviewItem, PreviewResult, SyncResult,
};
use serde::Serialize;
use tabled::Tabled;

use super::shared::{Access, Context, OutputFormat, money, or_dash, print_json, print_rows};
use crate::progress::ProgressReporter;
use crate::shutdown;

/// One sync attempt, for display.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct AttemptRow {
    #[tabled(rename = "Donation")]
    donation_id: DonationId,
    #[tabled(rename = "Type")]
    donation_type: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Donor")]
    donor: String,
    #[tabled(rename = "Gift")]
    gift: String,
    #[tabled(rename = "Pledge")]
    pledge: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&SyncResult> for AttemptRow {
    fn from(result: &SyncResult) -> Self {
        let donor = match (result.donor_action, result.dest_donor_id) {
            (Some(action), Some(id)) => format!("#{id} ({action})"),
            (_, id) => or_dash(id.map(|id| format!("#{id}"))),
        };
        let pledge = match result.dest_pledge_id {
            Some(id) if result.pledge_created => format!("#{id} (new)"),
            id => or_dash(id.map(|id| format!("#{id}"))),
        };

        Self {
            donation_id: result.donation_id,
            donation_type: result.donation_type.to_string(),
            amount: money(result.amount),
            status: result.status.to_string(),
            donor,
            gift: or_dash(result.dest_gift_id.map(|id| format!("#{id}"))),
            pledge,
            message: result.message.clone().unwrap_or_default(),
        }
    }
}

/// One previewed donation, for display.
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct PreviewRow {
    #[tabled(rename = "Donation")]
    donation_id: DonationId,
    #[tabled(rename = "Type")]
    donation_type: String,
    #[tabled(rename = "Amount")]
    amount: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Donor")]
    donor: String,
    #[tabled(rename = "Pledge")]
    pledge: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&PreviewItem> for PreviewRow {
    fn from(item: &PreviewItem) -> Self {
        let donor = match (item.donor_action, item.dest_donor_id) {
            (Some(action), Some(id)) => format!("{action} #{id}"),
            (Some(action), None) => action.to_string(),
            (None, _) => "-".to_string(),
        };

        Self {
            donation_id: item.donation_id,
            donation_type: item.donation_type.to_string(),
            amount: money(item.amount),
            email: item.email.clone(),
            donor,
            pledge: item.pledge_action.to_string(),
            outcome: item.status.to_string(),
            message: item.message.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Batches")]
    batches: u32,
    #[tabled(rename = "Processed")]
    processed: usize,
    #[tabled(rename = "Synced")]
    succeeded: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Still unsynced")]
    unsynced: String,
}

impl From<&BackfillSummary> for SummaryRow {
    fn from(summary: &BackfillSummary) -> Self {
        Self {
            batches: summary.batches,
            processed: summary.processed,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            retries: summary.retries,
            unsynced: or_dash(summary.total_unsynced),
        }
    }
}

/// A status the backfill leaves out, for display.
#[derive(Debug, Serialize, Tabled)]
struct ExcludedRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Meaning")]
    meaning: &'static str,
}

impl From<&ExcludedStatus> for ExcludedRow {
    fn from(excluded: &ExcludedStatus) -> Self {
        Self {
            status: excluded.status.to_string(),
            count: excluded.count,
            meaning: excluded.meaning,
        }
    }
}

fn overview_lines(overview: &BackfillOverview) -> Vec<String> {
    let mut lines = vec![
        format!("Completed donations: {}", overview.completed),
        format!("Already synced:      {}", overview.synced),
        format!("Remaining to sync:   {}", overview.remaining),
    ];
    if !overview.excluded.is_empty() {
        lines.push(format!(
            "Not synced ({}): these donations were never completed.",
            overview.excluded_total()
        ));
    }
    lines
}

/// Print the backfill counts, then the excluded statuses as a table.
pub(crate) fn print_overview(overview: &BackfillOverview) -> Result<(), serde_json::Error> {
    for line in overview_lines(overview) {
        println!("{line}");
    }
    if !overview.excluded.is_empty() {
        let rows = overview.excluded.iter().map(ExcludedRow::from).collect();
        print_rows(rows, OutputFormat::Table)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct DryRun<'a> {
    overview: &'a BackfillOverview,
    preview: &'a PreviewResult,
}

/// Sync one donation by id.
///
/// With `realtime`, the donation only syncs when real-time sync is enabled,
/// the way a completed-payment hook would trigger it.
pub(crate) async fn handle_sync(
    ctx: &Context,
    donation_id: DonationId,
    realtime: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::Full).await?;

    let result = if realtime {
        match engine.sync_realtime(donation_id).await? {
            Some(result) => result,
            None => {
                println!("Real-time sync is disabled. Set [sync] enabled = true to turn it on.");
                return Ok(());
            }
        }
    } else {
        engine.sync_single(donation_id).await?
    };

    match output {
        OutputFormat::Table => print_rows(vec![AttemptRow::from(&result)], output)?,
        OutputFormat::Json => print_json(&result)?,
    }

    if result.is_error() {
        return Err(format!("Donation #{donation_id} was not synced").into());
    }
    Ok(())
}

/// Run the backfill, or preview the next batch with `dry_run`.
pub(crate) async fn handle_backfill(
    ctx: &Context,
    batch_size: Option<u64>,
    dry_run: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::Full).await?;

    let overview = engine.backfill_overview().await?;

    if dry_run {
        let preview = engine
            .preview_backfill(batch_size.unwrap_or(PREVIEW_BATCH_SIZE))
            .await?;
        match output {
            OutputFormat::Table => {
                print_overview(&overview)?;
                println!();
                print_preview(&preview)?;
            }
            OutputFormat::Json => print_json(&DryRun {
                overview: &overview,
                preview: &preview,
            })?,
        }
        return Ok(());
    }

    if output == OutputFormat::Table {
        print_overview(&overview)?;
        if overview.remaining == 0 {
            println!("Nothing to sync.");
            return Ok(());
        }
        println!();
    }

    let mut config = BackfillConfig::default();
    if let Some(size) = batch_size {
        config = config.with_batch_size(size);
    }

    let reporter = Arc::new(ProgressReporter::new());
    let backfill = engine
        .backfill_with(config)
        .with_progress(reporter.as_callback());
    shutdown::cancel_on_ctrl_c(backfill.canceller());

    let summary = backfill.run().await;
    reporter.finish();

    match output {
        OutputFormat::Table => {
            print_rows(vec![SummaryRow::from(&summary)], output)?;
            if summary.cancelled {
                println!("Backfill cancelled. Run it again to continue.");
            }
        }
        OutputFormat::Json => print_json(&summary)?,
    }

    if let Some(error) = summary.error {
        return Err(format!("Backfill stopped: {error}").into());
    }
    Ok(())
}

fn print_preview(preview: &PreviewResult) -> Result<(), Box<dyn std::error::Error>> {
    if preview.items.is_empty() {
        println!("Nothing to sync.");
        return Ok(());
    }
    print_rows(
        preview.items.iter().map(PreviewRow::from).collect(),
        OutputFormat::Table,
    )?;
    println!(
        "Dry run: {} of {} unsynced donations shown{}. Nothing was sent.",
        preview.processed,
        preview.total_unsynced,
        if preview.has_more { ", more remain" } else { "" }
    );
    Ok(())
}
