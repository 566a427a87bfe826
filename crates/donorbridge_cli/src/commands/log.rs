use std::path::{Path, PathBuf};

use donorbridge::entity::sync_log::Model as LogEntry;
use donorbridge::entity::sync_status::SyncStatus;
use donorbridge::log_store::export_file_name;
use serde::Serialize;
use tabled::Tabled;

use super::shared::{Access, Context, Engine, OutputFormat, money, or_dash, print_rows};
use crate::LogAction;

/// Status filter for `log list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum StatusFilter {
    Success,
    Error,
    Skipped,
}

impl From<StatusFilter> for SyncStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Success => SyncStatus::Success,
            StatusFilter::Error => SyncStatus::Error,
            StatusFilter::Skipped => SyncStatus::Skipped,
        }
    }
}

/// A log entry, for display.
#[derive(Debug, Serialize, Tabled)]
struct LogRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "When")]
    created_at: String,
    #[tabled(rename = "Donation")]
    donation_id: i64,
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
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&LogEntry> for LogRow {
    fn from(entry: &LogEntry) -> Self {
        let donor = match entry.donor_action {
            Some(action) => format!("{} ({})", or_dash(entry.dest_donor_id), action),
            None => or_dash(entry.dest_donor_id),
        };
        let pledge = match entry.dest_pledge_id {
            Some(id) if entry.pledge_created => format!("{id} (new)"),
            id => or_dash(id),
        };

        Self {
            id: entry.id,
            created_at: entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            donation_id: entry.donation_id,
            donation_type: entry.donation_type.to_string(),
            amount: money(entry.amount()),
            status: entry.status.to_string(),
            donor,
            gift: or_dash(entry.dest_gift_id),
            pledge,
            error: entry.error_message.clone().unwrap_or_default(),
        }
    }
}

pub(crate) async fn handle_log(
    ctx: &Context,
    action: LogAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = ctx.open_engine(Access::LogOnly).await?;

    match action {
        LogAction::List {
            limit,
            offset,
            status,
            output,
        } => {
            let entries = engine.get_log(limit, offset, status.map(Into::into)).await?;
            if entries.is_empty() && output == OutputFormat::Table {
                println!("No log entries.");
                return Ok(());
            }
            match output {
                OutputFormat::Table => {
                    print_rows(entries.iter().map(LogRow::from).collect(), output)?;
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
            }
        }
        LogAction::Export { path } => {
            let path = path.unwrap_or_else(default_export_path);
            let rows = export_to(&engine, &path).await?;
            println!("Exported {} log entries to {}", rows, path.display());
        }
        LogAction::Clear { yes, export } => {
            if !yes {
                return Err("Clearing the log makes every donation unsynced again, and the next \
                            backfill re-sends gifts the destination already has. \
                            Re-run with --yes to confirm (add --export <PATH> to keep a copy)."
                    .into());
            }
            if let Some(path) = export {
                let rows = export_to(&engine, &path).await?;
                println!("Exported {} log entries to {}", rows, path.display());
            }
            let cleared = engine.clear_log().await?;
            tracing::warn!(cleared, "Sync log cleared");
            println!("Cleared {} log entries.", cleared);
        }
    }

    Ok(())
}

fn default_export_path() -> PathBuf {
    PathBuf::from(export_file_name(chrono::Local::now().date_naive()))
}

/// Write the CSV export and return the number of data rows.
async fn export_to(engine: &Engine, path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let csv = engine.export_log().await?;
    std::fs::write(path, &csv)?;
    Ok(count_data_rows(&csv))
}

fn count_data_rows(csv: &[u8]) -> usize {
    csv.split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .count()
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use donorbridge::entity::donation_type::DonationType;
    use donorbridge::entity::donor_action::DonorAction;

    use super::*;

    fn entry() -> LogEntry {
        LogEntry {
            id: 12,
            donation_id: 1042,
            donation_type: DonationType::SubscriptionInitial,
            amount_cents: 2500,
            donor_action: Some(DonorAction::Created),
            dest_donor_id: Some(41),
            dest_gift_id: Some(900),
            dest_pledge_id: Some(300),
            pledge_created: true,
            status: SyncStatus::Success,
            error_message: None,
            created_at: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2026, 3, 1, 9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn log_row_formats_an_entry() {
        let row = LogRow::from(&entry());
        assert_eq!(row.created_at, "2026-03-01 09:30:00");
        assert_eq!(row.amount, "25.00");
        assert_eq!(row.donor, "41 (created)");
        assert_eq!(row.pledge, "300 (new)");
        assert_eq!(row.gift, "900");
        assert_eq!(row.error, "");
    }

    #[test]
    fn log_row_for_a_failed_attempt() {
        let mut entry = entry();
        entry.status = SyncStatus::Error;
        entry.dest_gift_id = None;
        entry.dest_pledge_id = None;
        entry.pledge_created = false;
        entry.error_message = Some("Invalid GL code".to_string());
        let row = LogRow::from(&entry);
        assert_eq!(row.status, "error");
        assert_eq!(row.gift, "-");
        assert_eq!(row.pledge, "-");
        assert_eq!(row.error, "Invalid GL code");
    }

    #[test]
    fn status_filter_maps_to_sync_status() {
        assert_eq!(SyncStatus::from(StatusFilter::Skipped), SyncStatus::Skipped);
        assert_eq!(SyncStatus::from(StatusFilter::Error), SyncStatus::Error);
    }

    #[test]
    fn data_rows_exclude_the_header() {
        assert_eq!(count_data_rows(b"id,donation_id\n1,2\n3,4\n"), 2);
        assert_eq!(count_data_rows(b"id,donation_id\n"), 0);
        assert_eq!(count_data_rows(b""), 0);
    }

    #[test]
    fn default_export_path_is_dated() {
        let path = default_export_path();
        assert!(path.to_string_lossy().ends_with(".csv"));
    }
}
