use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};

use crate::entity::sync_log::{Column, Entity as SyncLog, Model};

use super::errors::{LogStoreError, Result};

const HEADER: [&str; 12] = [
    "id",
    "donation_id",
    "donation_type",
    "amount",
    "donor_action",
    "dest_donor_id",
    "dest_gift_id",
    "dest_pledge_id",
    "pledge_created",
    "status",
    "error_message",
    "created_at",
];

/// Default export file name for a given day, e.g. `sync-log-2026-03-01.csv`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("sync-log-{}.csv", date.format("%Y-%m-%d"))
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn record(entry: &Model) -> [String; 12] {
    [
        entry.id.to_string(),
        entry.donation_id.to_string(),
        entry.donation_type.to_string(),
        entry.amount().to_string(),
        opt(entry.donor_action),
        opt(entry.dest_donor_id),
        opt(entry.dest_gift_id),
        opt(entry.dest_pledge_id),
        entry.pledge_created.to_string(),
        entry.status.to_string(),
        entry.error_message.clone().unwrap_or_default(),
        entry.created_at.to_rfc3339(),
    ]
}

pub(super) async fn export_csv(db: &DatabaseConnection) -> Result<Vec<u8>> {
    let entries = SyncLog::find().order_by_asc(Column::Id).all(db).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for entry in &entries {
        writer.write_record(record(entry))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LogStoreError::export(e.to_string()))?;
    tracing::debug!(rows = entries.len(), bytes = bytes.len(), "Exported sync log");
    Ok(bytes)
}
