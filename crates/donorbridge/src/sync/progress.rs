//! Progress events for batch sync and backfill.

use crate::destination::DestinationId;
use crate::entity::donor_action::DonorAction;
use crate::source::DonationId;

/// Progress events emitted while syncing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Starting a batch.
    BatchStarted {
        /// 1-based batch number within the backfill (1 outside a backfill).
        batch: u32,
        batch_size: u64,
        after: Option<DonationId>,
    },

    /// A donation was delivered.
    DonationSynced {
        donation_id: DonationId,
        donor_action: DonorAction,
        gift_id: DestinationId,
        pledge_id: Option<DestinationId>,
    },

    /// A donation was skipped.
    DonationSkipped {
        donation_id: DonationId,
        reason: String,
    },

    /// A donation's attempt failed.
    DonationFailed {
        donation_id: DonationId,
        error: String,
        transient: bool,
    },

    /// A batch finished.
    BatchComplete {
        batch: u32,
        processed: usize,
        /// Advisory count of unsynced donations.
        total_unsynced: u64,
        remaining: u64,
    },

    /// The whole batch call failed and will be retried.
    BatchRetry {
        attempt: u32,
        retry_after_ms: u64,
        error: String,
    },

    /// The backfill stopped on request.
    BackfillCancelled {
        processed: usize,
    },

    /// The backfill stopped on an error retrying cannot fix.
    BackfillFailed {
        error: String,
    },

    /// Nothing left beyond the cursor.
    BackfillComplete {
        batches: u32,
        processed: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },

    /// Warning message (non-fatal).
    Warning {
        message: String,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_calls_the_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            Some(&callback),
            SyncProgress::DonationSkipped {
                donation_id: 1,
                reason: "Already synced".to_string(),
            },
        );
        emit(
            Some(&callback),
            SyncProgress::BatchComplete {
                batch: 1,
                processed: 5,
                total_unsynced: 10,
                remaining: 5,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emit_without_callback_is_a_no_op() {
        emit(
            None,
            SyncProgress::Warning {
                message: "x".to_string(),
            },
        );
    }

    #[test]
    fn debug_output_names_the_event() {
        let event = SyncProgress::DonationFailed {
            donation_id: 42,
            error: "Invalid GL code".to_string(),
            transient: false,
        };
        let debug_str = format!("{event:?}");
        assert!(debug_str.contains("DonationFailed"));
        assert!(debug_str.contains("Invalid GL code"));
    }
}
