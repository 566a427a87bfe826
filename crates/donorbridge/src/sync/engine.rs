//! The sync orchestrator.
//!
//! [`SyncEngine`] owns its collaborators: the donation source, the
//! destination client, the sync log and the pledge map. Each donation attempt
//! runs `match donor -> link pledge (recurring only) -> translate -> create
//! gift` and writes exactly one log entry, whatever the outcome.
//!
//! # Example
//!
//! ```ignore
//! use donorbridge::sync::{BatchRequest, SyncEngine};
//!
//! let engine = SyncEngine::new(Arc::new(db), source, destination, settings);
//! let batch = engine.sync_batch(BatchRequest::default()).await?;
//! println!("{} processed, {} remaining", batch.processed, batch.remaining);
//! ```

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::watch;

use crate::destination::{
    ConnectionStatus, DestinationClient, DestinationError, DestinationId, short_error_message,
};
use crate::entity::sync_log::Model as LogEntry;
use crate::entity::sync_status::SyncStatus;
use crate::log_store::{ChartData, LogFilter, LogStore, NewLogEntry, SyncStats};
use crate::pledge::{PledgeLink, PledgeLinker, PledgeMapStore};
use crate::settings::SyncSettings;
use crate::source::{Donation, DonationId, DonationSource};

use super::backfill::{Backfill, BackfillConfig};
use super::errors::{AttemptError, Result, SyncError};
use super::matcher::{DonorMatcher, MatchedDonor};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{
    BackfillOverview, BatchRequest, BatchResult, CodeCheck, MatchReport, PreviewResult,
    SkipReason, SyncResult,
};
use super::{preview, report, translate, unsynced};

/// Check the donation's own data. Returns the normalized email when it can
/// be sent.
pub(crate) fn validate(donation: &Donation) -> std::result::Result<String, SkipReason> {
    if !donation.status.is_completed() {
        return Err(SkipReason::NotCompleted {
            status: donation.status,
        });
    }
    if donation.amount.is_sign_negative() || donation.amount.is_zero() {
        return Err(SkipReason::NonPositiveAmount);
    }
    donation
        .donor
        .normalized_email()
        .ok_or(SkipReason::InvalidEmail)
}

/// The subscription id of a recurring donation, if it has a usable one.
pub(crate) fn subscription_of(donation: &Donation) -> Option<&str> {
    donation
        .subscription_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Ids resolved so far in one attempt, kept for the log entry even when a
/// later step fails.
#[derive(Debug, Default)]
struct Resolved {
    donor: Option<MatchedDonor>,
    pledge: Option<PledgeLink>,
    gift_id: Option<DestinationId>,
}

/// Donation sync engine.
pub struct SyncEngine<S, D> {
    source: S,
    destination: D,
    log: LogStore,
    pledges: PledgeLinker,
    settings: SyncSettings,
}

impl<S, D> SyncEngine<S, D> {
    /// The sync log and the pledge map share `db`.
    pub fn new(
        db: Arc<DatabaseConnection>,
        source: S,
        destination: D,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            destination,
            log: LogStore::new(Arc::clone(&db)),
            pledges: PledgeLinker::new(PledgeMapStore::new(db)),
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn pledges(&self) -> &PledgeLinker {
        &self.pledges
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}

impl<S: DonationSource, D: DestinationClient> SyncEngine<S, D> {
    // ─── Single donation ─────────────────────────────────────────────────

    /// Sync one donation on request (admin "sync now").
    ///
    /// # Errors
    /// `DonationNotFound` if the source has no such donation, `Source` if the
    /// source could not be read, `Log` if the outcome could not be recorded.
    /// Destination failures are not errors here: they come back as a result
    /// with `status = error`.
    pub async fn sync_single(&self, donation_id: DonationId) -> Result<SyncResult> {
        let result = self.sync_one(donation_id).await?;
        tracing::info!(
            donation_id,
            status = %result.status,
            message = result.message.as_deref().unwrap_or_default(),
            "Single donation sync finished"
        );
        Ok(result)
    }

    /// Fetch one donation and attempt it.
    pub async fn sync_one(&self, donation_id: DonationId) -> Result<SyncResult> {
        let donation = self
            .source
            .fetch_by_id(donation_id)
            .await?
            .ok_or(SyncError::DonationNotFound(donation_id))?;
        self.attempt(&donation, None).await
    }

    /// Entry point for newly completed donations. Does nothing unless
    /// real-time sync is enabled.
    pub async fn sync_realtime(&self, donation_id: DonationId) -> Result<Option<SyncResult>> {
        if !self.settings.sync_enabled {
            tracing::debug!(donation_id, "Real-time sync disabled, ignoring donation");
            return Ok(None);
        }
        self.sync_one(donation_id).await.map(Some)
    }

    // ─── Batches ─────────────────────────────────────────────────────────

    /// Attempt the next unsynced donations, one at a time.
    ///
    /// A donation the destination rejects is recorded and the batch moves on.
    /// A destination transport failure is recorded too, then stops the batch
    /// with [`SyncError::Destination`] so the caller can retry it later.
    /// Source and log failures abort the batch.
    pub async fn sync_batch(&self, request: BatchRequest) -> Result<BatchResult> {
        self.run_batch(request, 1, None, None).await
    }

    /// [`sync_batch`](Self::sync_batch) with progress events.
    pub async fn sync_batch_with_progress(
        &self,
        request: BatchRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<BatchResult> {
        self.run_batch(request, 1, on_progress, None).await
    }

    /// One batch from the start of the unsynced set.
    ///
    /// Donations that failed in an earlier call come first. `has_more` only
    /// looks beyond the batch: failed donations left behind show up in
    /// `total_unsynced`. Loop over [`sync_batch`](Self::sync_batch) with the
    /// returned cursor, or use [`backfill`](Self::backfill), to walk the
    /// whole set; repeating this call stalls once `batch_size` donations fail
    /// for good.
    pub async fn run_backfill_batch(&self, batch_size: u64) -> Result<BatchResult> {
        self.sync_batch(BatchRequest::new(batch_size)).await
    }

    pub(crate) async fn run_batch(
        &self,
        request: BatchRequest,
        batch: u32,
        on_progress: Option<&ProgressCallback>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<BatchResult> {
        let mut result = BatchResult::default();
        self.fill_batch(request, batch, on_progress, cancel, &mut result)
            .await?;
        Ok(result)
    }

    /// Run one batch, recording each attempt in `result` as it finishes, so a
    /// caller that gives up on the batch still knows what was done.
    ///
    /// Cancellation is checked between donations, so an attempt that reached
    /// the destination is always logged.
    pub(crate) async fn fill_batch(
        &self,
        request: BatchRequest,
        batch: u32,
        on_progress: Option<&ProgressCallback>,
        cancel: Option<&watch::Receiver<bool>>,
        result: &mut BatchResult,
    ) -> Result<()> {
        emit(
            on_progress,
            SyncProgress::BatchStarted {
                batch,
                batch_size: request.batch_size,
                after: request.after,
            },
        );
        result.cursor = request.after;

        let mut synced = self.log.synced_ids().await?;
        let donations =
            unsynced::select(&self.source, &synced, request.after, request.batch_size).await?;

        for donation in &donations {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                tracing::debug!(batch, donation_id = donation.id, "Batch stopped early");
                break;
            }
            let item = self.attempt(donation, on_progress).await?;
            result.processed += 1;
            if item.is_success() {
                result.succeeded += 1;
                synced.insert(donation.id);
            } else if item.is_error() {
                result.failed += 1;
            } else {
                result.skipped += 1;
            }

            // The cursor stays before a donation that hit a transport failure
            if item.transient {
                let message = item.message.clone().unwrap_or_default();
                result.items.push(item);
                tracing::warn!(
                    batch,
                    donation_id = donation.id,
                    error = %message,
                    "Destination transport failure, stopping batch"
                );
                return Err(SyncError::Destination {
                    donation_id: donation.id,
                    message,
                });
            }
            result.cursor = Some(donation.id);
            result.items.push(item);
        }

        let tally = unsynced::tally(&self.source, &synced, result.cursor).await?;
        result.total_unsynced = tally.total;
        result.remaining = tally.beyond_cursor;
        result.has_more = result.remaining > 0;

        tracing::info!(
            batch,
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            total_unsynced = result.total_unsynced,
            remaining = result.remaining,
            "Batch complete"
        );
        emit(
            on_progress,
            SyncProgress::BatchComplete {
                batch,
                processed: result.processed,
                total_unsynced: result.total_unsynced,
                remaining: result.remaining,
            },
        );

        Ok(())
    }

    /// Dry run over the next `batch_size` unsynced donations. Reads only.
    pub async fn preview_backfill(&self, batch_size: u64) -> Result<PreviewResult> {
        let synced = self.log.synced_ids().await?;
        let donations = unsynced::select(&self.source, &synced, None, batch_size).await?;
        let total_unsynced = unsynced::count(&self.source, &synced).await?;

        let items = preview::preview(&self.destination, &self.pledges, &donations).await;

        Ok(PreviewResult {
            processed: items.len(),
            total_unsynced,
            has_more: total_unsynced > items.len() as u64,
            items,
        })
    }

    /// A backfill over the unsynced set with default pacing.
    pub fn backfill(&self) -> Backfill<'_, S, D> {
        Backfill::new(self, BackfillConfig::default())
    }

    pub fn backfill_with(&self, config: BackfillConfig) -> Backfill<'_, S, D> {
        Backfill::new(self, config)
    }

    /// Number of completed donations whose effective state is not synced.
    pub async fn count_unsynced(&self) -> Result<u64> {
        let synced = self.log.synced_ids().await?;
        Ok(unsynced::count(&self.source, &synced).await?)
    }

    /// Completed donations split into synced and remaining, and the donations
    /// left out because they never completed, by status. Reads only.
    pub async fn backfill_overview(&self) -> Result<BackfillOverview> {
        let counts = self.source.count_by_status().await?;
        let remaining = self.count_unsynced().await?;
        Ok(BackfillOverview::new(&counts, remaining))
    }

    /// The first `limit` unsynced donations, ascending by id.
    pub async fn fetch_unsynced(&self, limit: u64) -> Result<Vec<Donation>> {
        let synced = self.log.synced_ids().await?;
        Ok(unsynced::select(&self.source, &synced, None, limit).await?)
    }

    // ─── One attempt ─────────────────────────────────────────────────────

    async fn attempt(
        &self,
        donation: &Donation,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncResult> {
        let base = NewLogEntry::new(
            donation.id,
            donation.donation_type,
            donation.amount_cents(),
            SyncStatus::Skipped,
        );

        let checked = if self.log.is_synced(donation.id).await? {
            Err(SkipReason::AlreadySynced)
        } else {
            validate(donation)
        };

        let email = match checked {
            Ok(email) => email,
            Err(reason) => {
                let entry = self.log.append(base.with_error(reason.to_string())).await?;
                tracing::info!(donation_id = donation.id, %reason, "Donation skipped");
                emit(
                    on_progress,
                    SyncProgress::DonationSkipped {
                        donation_id: donation.id,
                        reason: reason.to_string(),
                    },
                );
                return Ok(SyncResult::from_entry(&entry, false));
            }
        };

        let mut resolved = Resolved::default();
        let outcome = self.deliver(donation, &email, &mut resolved).await;

        let entry = NewLogEntry {
            donor_action: resolved.donor.map(|d| d.action),
            dest_donor_id: resolved.donor.map(|d| d.donor_id),
            dest_gift_id: resolved.gift_id,
            dest_pledge_id: resolved.pledge.map(PledgeLink::pledge_id),
            pledge_created: resolved.pledge.is_some_and(PledgeLink::created),
            ..base
        };

        match outcome {
            Ok(()) => {
                let entry = self
                    .log
                    .append(NewLogEntry {
                        status: SyncStatus::Success,
                        ..entry
                    })
                    .await?;
                self.report_success(&entry, on_progress);
                Ok(SyncResult::from_entry(&entry, false))
            }
            Err(e) => {
                let transient = e.is_transient();
                let message = short_error_message(&e);
                let entry = self
                    .log
                    .append(
                        NewLogEntry {
                            status: SyncStatus::Error,
                            ..entry
                        }
                        .with_error(message.clone()),
                    )
                    .await?;
                tracing::warn!(
                    donation_id = donation.id,
                    transient,
                    error = %message,
                    "Donation sync failed"
                );
                emit(
                    on_progress,
                    SyncProgress::DonationFailed {
                        donation_id: donation.id,
                        error: message,
                        transient,
                    },
                );
                Ok(SyncResult::from_entry(&entry, transient))
            }
        }
    }

    async fn deliver(
        &self,
        donation: &Donation,
        email: &str,
        resolved: &mut Resolved,
    ) -> std::result::Result<(), AttemptError> {
        let subscription_id = if donation.donation_type.is_recurring() {
            Some(
                subscription_of(donation).ok_or(AttemptError::MissingSubscription {
                    donation_id: donation.id,
                })?,
            )
        } else {
            None
        };

        let donor = DonorMatcher::new(&self.destination)
            .resolve(email, &donation.donor)
            .await?;
        resolved.donor = Some(donor);

        let pledge_id = match subscription_id {
            Some(subscription_id) => {
                let payload = translate::pledge_payload(
                    donation,
                    subscription_id,
                    &self.settings,
                    donor.donor_id,
                );
                let link = self
                    .pledges
                    .link(&self.destination, subscription_id, &payload)
                    .await?;
                resolved.pledge = Some(link);
                Some(link.pledge_id())
            }
            None => None,
        };

        let gift = translate::translate(donation, &self.settings, donor.donor_id, pledge_id);
        let gift_id = self
            .destination
            .create_gift(&gift)
            .await
            .map_err(AttemptError::Gift)?;
        resolved.gift_id = Some(gift_id);

        Ok(())
    }

    fn report_success(&self, entry: &LogEntry, on_progress: Option<&ProgressCallback>) {
        tracing::info!(
            donation_id = entry.donation_id,
            donation_type = %entry.donation_type,
            donor_id = entry.dest_donor_id,
            gift_id = entry.dest_gift_id,
            pledge_id = entry.dest_pledge_id,
            "Donation synced"
        );
        if let (Some(donor_action), Some(gift_id)) = (entry.donor_action, entry.dest_gift_id) {
            emit(
                on_progress,
                SyncProgress::DonationSynced {
                    donation_id: entry.donation_id,
                    donor_action,
                    gift_id,
                    pledge_id: entry.dest_pledge_id,
                },
            );
        }
    }

    // ─── Reporting ───────────────────────────────────────────────────────

    pub async fn get_stats(&self) -> Result<SyncStats> {
        Ok(self.log.stats().await?)
    }

    pub async fn get_chart_data(&self) -> Result<ChartData> {
        Ok(self.log.chart_data().await?)
    }

    /// Log entries, newest first, optionally only those with `status`.
    pub async fn get_log(
        &self,
        limit: u64,
        offset: u64,
        status: Option<SyncStatus>,
    ) -> Result<Vec<LogEntry>> {
        let filter = LogFilter {
            status,
            ..LogFilter::default()
        };
        Ok(self.log.query(&filter, limit, offset).await?)
    }

    /// Delete the whole sync log.
    ///
    /// **Irreversible.** Every donation becomes unsynced again, and the next
    /// backfill re-sends donations the destination already has, creating
    /// duplicate gifts. Export the log first. The pledge map is kept.
    pub async fn clear_log(&self) -> Result<u64> {
        Ok(self.log.clear().await?)
    }

    /// The whole log as CSV.
    pub async fn export_log(&self) -> Result<Vec<u8>> {
        Ok(self.log.export_csv().await?)
    }

    /// Compare every source donor against the destination. Reads only.
    pub async fn match_report(&self) -> Result<MatchReport> {
        let donors = self.source.list_donors().await?;
        Ok(report::build(&self.destination, &donors).await)
    }

    // ─── Configuration checks ────────────────────────────────────────────

    pub async fn test_connection(&self) -> std::result::Result<ConnectionStatus, DestinationError> {
        self.destination.test_connection().await
    }

    /// Check every configured code against the destination's code tables.
    pub async fn validate_codes(&self) -> std::result::Result<Vec<CodeCheck>, DestinationError> {
        let mut checks = Vec::new();
        for (field, value) in self.settings.codes_to_validate() {
            let valid = self.destination.validate_code(field, &value).await?;
            if !valid {
                tracing::warn!(field = %field, value, "Code not found on destination");
            }
            checks.push(CodeCheck {
                field,
                value,
                valid,
            });
        }
        Ok(checks)
    }
}
