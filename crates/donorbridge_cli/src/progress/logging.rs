use donorbridge::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::BatchStarted {
                batch,
                batch_size,
                after,
            } => {
                tracing::debug!(batch, batch_size, after = ?after, "Starting batch");
            }

            SyncProgress::DonationSynced {
                donation_id,
                donor_action,
                gift_id,
                pledge_id,
            } => {
                tracing::debug!(
                    donation_id,
                    donor_action = %donor_action,
                    gift_id,
                    pledge_id = ?pledge_id,
                    "Donation synced"
                );
            }

            SyncProgress::DonationSkipped {
                donation_id,
                reason,
            } => {
                tracing::debug!(donation_id, reason = %reason, "Donation skipped");
            }

            SyncProgress::DonationFailed {
                donation_id,
                error,
                transient,
            } => {
                tracing::warn!(donation_id, transient, error = %error, "Donation failed");
            }

            SyncProgress::BatchComplete {
                batch,
                processed,
                total_unsynced,
                remaining,
            } => {
                tracing::info!(batch, processed, total_unsynced, remaining, "Batch complete");
            }

            SyncProgress::BatchRetry {
                attempt,
                retry_after_ms,
                error,
            } => {
                tracing::warn!(attempt, retry_after_ms, error = %error, "Batch failed, retrying");
            }

            SyncProgress::BackfillCancelled { processed } => {
                tracing::warn!(processed, "Backfill cancelled");
            }

            SyncProgress::BackfillFailed { error } => {
                tracing::error!(error = %error, "Backfill failed");
            }

            SyncProgress::BackfillComplete {
                batches,
                processed,
                succeeded,
                failed,
                skipped,
            } => {
                tracing::info!(
                    batches,
                    processed,
                    succeeded,
                    failed,
                    skipped,
                    "Backfill complete"
                );
            }

            SyncProgress::Warning { message } => {
                tracing::warn!("{}", message);
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
