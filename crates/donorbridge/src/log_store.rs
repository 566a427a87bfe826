//! Append-only sync log.
//!
//! Every sync attempt writes exactly one row. Nothing is ever updated in
//! place; the newest row per donation that records a delivery outcome
//! (success or error) decides whether the donation is synced. Skip rows are
//! kept for the audit trail only.
//!
//! All dashboard numbers are computed from the log on demand. There are no
//! separate counters.

mod errors;
mod export;
mod query;
mod stats;

use std::collections::BTreeSet;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use errors::{LogStoreError, Result};
pub use export::export_file_name;
pub use query::{LogFilter, NewLogEntry};
pub use stats::{AmountBucket, ChartData, DailyCount, SyncStats, TypeBreakdown};

use crate::entity::sync_log::Model;
use crate::source::DonationId;

/// Handle to the sync log table. Shares the connection with the pledge map.
#[derive(Debug, Clone)]
pub struct LogStore {
    db: Arc<DatabaseConnection>,
}

impl LogStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Record one attempt.
    pub async fn append(&self, entry: NewLogEntry) -> Result<Model> {
        query::append(&self.db, entry).await
    }

    /// Entries matching `filter`, newest first.
    pub async fn query(&self, filter: &LogFilter, limit: u64, offset: u64) -> Result<Vec<Model>> {
        query::find(&self.db, filter, limit, offset).await
    }

    /// Number of entries matching `filter`.
    pub async fn count(&self, filter: &LogFilter) -> Result<u64> {
        query::count(&self.db, filter).await
    }

    /// Every attempt for one donation, oldest first.
    pub async fn history(&self, donation_id: DonationId) -> Result<Vec<Model>> {
        query::history(&self.db, donation_id).await
    }

    /// Whether the donation's effective state is synced.
    pub async fn is_synced(&self, donation_id: DonationId) -> Result<bool> {
        query::is_synced(&self.db, donation_id).await
    }

    /// Ids of all donations whose effective state is synced.
    pub async fn synced_ids(&self) -> Result<BTreeSet<DonationId>> {
        query::synced_ids(&self.db).await
    }

    /// Aggregate counters for the dashboard.
    pub async fn stats(&self) -> Result<SyncStats> {
        stats::stats(&self.db).await
    }

    /// Chart series for the dashboard.
    pub async fn chart_data(&self) -> Result<ChartData> {
        stats::chart_data(&self.db).await
    }

    /// The whole log as CSV, oldest first.
    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        export::export_csv(&self.db).await
    }

    /// Delete every log entry and return how many were removed.
    ///
    /// Irreversible. Every donation reverts to unsynced, so the next backfill
    /// re-sends donations the destination already has and can create
    /// duplicate gifts. Export the log first if it may be needed.
    pub async fn clear(&self) -> Result<u64> {
        query::clear(&self.db).await
    }
}
