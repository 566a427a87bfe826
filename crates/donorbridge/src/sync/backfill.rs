//! Backfill coordinator.
//!
//! Drives repeated batch calls over the unsynced set, one batch at a time,
//! until nothing is left beyond the cursor or the caller cancels. A batch call
//! that fails for a transient reason (source or destination transport
//! failure, timeout) is retried after a capped linear delay; the retry count
//! is unbounded and resets after every successful batch. Errors retrying
//! cannot fix stop the backfill.
//!
//! Attempts made before a batch call failed still count in the summary, and
//! the retry resumes after the last donation that was not interrupted.
//!
//! [`Backfill::next`] yields one [`BackfillStep`] per batch call so callers
//! can render each step; [`Backfill::run`] drains it into a summary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::destination::DestinationClient;
use crate::retry::LinearBackoff;
use crate::source::{DonationId, DonationSource};

use super::engine::SyncEngine;
use super::errors::SyncError;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{BATCH_TIMEOUT, BatchRequest, BatchResult, DEFAULT_BATCH_SIZE, INTER_BATCH_DELAY};

/// Pacing for a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    pub batch_size: u64,
    /// Upper bound on one batch call. Exceeding it counts as a transient failure.
    pub batch_timeout: Duration,
    /// Pause before the next batch after a successful one.
    pub inter_batch_delay: Duration,
    pub backoff: LinearBackoff,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: BATCH_TIMEOUT,
            inter_batch_delay: INTER_BATCH_DELAY,
            backoff: LinearBackoff::default(),
        }
    }
}

impl BackfillConfig {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Handle that stops a running backfill. Cheap to clone and `Send`, so it
/// can be moved into a signal handler.
#[derive(Debug, Clone)]
pub struct BackfillCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl BackfillCanceller {
    /// Stop the backfill. A batch call in flight finishes the donation it is
    /// on and stops; donations it already delivered stay synced.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One step of a backfill.
#[derive(Debug)]
pub enum BackfillStep {
    /// A batch call finished.
    Batch(BatchResult),
    /// The batch call failed as a whole and will be retried after `delay`.
    Retrying {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// The backfill stopped on request. Always the last step.
    Cancelled,
    /// The backfill stopped on an error retrying cannot fix. Always the last step.
    Failed { error: SyncError },
}

/// Totals of a finished backfill.
///
/// `processed` and its breakdown count attempts, so a donation retried after a
/// transport failure is counted once as failed and once more when it syncs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BackfillSummary {
    /// Batch calls that completed.
    pub batches: u32,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Batch calls that failed and were retried.
    pub retries: u32,
    pub cancelled: bool,
    pub error: Option<String>,
    /// Unsynced count reported by the last successful batch.
    pub total_unsynced: Option<u64>,
}

/// A backfill in progress. Created by [`SyncEngine::backfill`].
pub struct Backfill<'a, S, D> {
    engine: &'a SyncEngine<S, D>,
    config: BackfillConfig,
    cursor: Option<DonationId>,
    /// Consecutive failed batch calls.
    retries: u32,
    pending_delay: Option<Duration>,
    finished: bool,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    on_progress: Option<ProgressCallback>,
    summary: BackfillSummary,
}

impl<'a, S, D> Backfill<'a, S, D> {
    pub(crate) fn new(engine: &'a SyncEngine<S, D>, config: BackfillConfig) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            engine,
            config,
            cursor: None,
            retries: 0,
            pending_delay: None,
            finished: false,
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
            on_progress: None,
            summary: BackfillSummary::default(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: BackfillConfig) -> Self {
        self.config = config;
        self
    }

    pub fn canceller(&self) -> BackfillCanceller {
        BackfillCanceller {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Highest donation id attempted so far.
    pub fn cursor(&self) -> Option<DonationId> {
        self.cursor
    }

    pub fn summary(&self) -> &BackfillSummary {
        &self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn cancelled(&mut self) -> BackfillStep {
        self.finished = true;
        self.summary.cancelled = true;
        tracing::info!(processed = self.summary.processed, "Backfill cancelled");
        emit(
            self.on_progress.as_ref(),
            SyncProgress::BackfillCancelled {
                processed: self.summary.processed,
            },
        );
        BackfillStep::Cancelled
    }

    /// Count the attempts of a batch call, finished or not.
    fn record_attempts(&mut self, batch: &BatchResult) {
        self.cursor = batch.cursor;
        self.summary.processed += batch.processed;
        self.summary.succeeded += batch.succeeded;
        self.summary.failed += batch.failed;
        self.summary.skipped += batch.skipped;
    }

    fn record_batch(&mut self, batch: &BatchResult) {
        self.retries = 0;
        self.record_attempts(batch);
        self.summary.batches += 1;
        self.summary.total_unsynced = Some(batch.total_unsynced);

        // A batch cut short by cancellation is not the end of the set; the
        // next call reports the cancellation.
        if *self.cancel_rx.borrow() {
            return;
        }

        // An empty batch cannot move the cursor, so stop even if the count
        // says otherwise.
        if batch.has_more && batch.processed > 0 {
            self.pending_delay = Some(self.config.inter_batch_delay);
            return;
        }

        self.finished = true;
        tracing::info!(
            batches = self.summary.batches,
            processed = self.summary.processed,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            "Backfill complete"
        );
        emit(
            self.on_progress.as_ref(),
            SyncProgress::BackfillComplete {
                batches: self.summary.batches,
                processed: self.summary.processed,
                succeeded: self.summary.succeeded,
                failed: self.summary.failed,
                skipped: self.summary.skipped,
            },
        );
    }
}

impl<S: DonationSource, D: DestinationClient> Backfill<'_, S, D> {
    /// Run the next batch call, after any pending delay.
    ///
    /// Cancelling interrupts the delay at once. A batch call in flight stops
    /// before its next donation and is reported as a normal step; the
    /// following call returns [`BackfillStep::Cancelled`]. Returns `None`
    /// once the backfill has completed, failed or been cancelled.
    pub async fn next(&mut self) -> Option<BackfillStep> {
        if self.finished {
            return None;
        }
        if *self.cancel_rx.borrow() {
            return Some(self.cancelled());
        }

        if let Some(delay) = self.pending_delay.take() {
            let mut cancel = self.cancel_rx.clone();
            let cancelled = tokio::select! {
                biased;

                Ok(_) = cancel.wait_for(|cancelled| *cancelled) => true,
                () = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                return Some(self.cancelled());
            }
        }

        let timeout = self.config.batch_timeout;
        let request = BatchRequest::new(self.config.batch_size).after(self.cursor);
        let mut batch = BatchResult {
            cursor: self.cursor,
            ..BatchResult::default()
        };
        let call = self.engine.fill_batch(
            request,
            self.summary.batches + 1,
            self.on_progress.as_ref(),
            Some(&self.cancel_rx),
            &mut batch,
        );
        let result = tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(Err(SyncError::Timeout(timeout)));

        match result {
            Ok(()) => {
                self.record_batch(&batch);
                Some(BackfillStep::Batch(batch))
            }
            Err(error) if error.is_transient() => {
                self.record_attempts(&batch);
                self.retries = self.retries.saturating_add(1);
                self.summary.retries += 1;
                let delay = self.config.backoff.delay_for(self.retries);
                self.pending_delay = Some(delay);

                let message = error.to_string();
                tracing::warn!(
                    attempt = self.retries,
                    retry_after_ms = delay.as_millis() as u64,
                    error = %message,
                    "Batch call failed, retrying"
                );
                emit(
                    self.on_progress.as_ref(),
                    SyncProgress::BatchRetry {
                        attempt: self.retries,
                        retry_after_ms: delay.as_millis() as u64,
                        error: message.clone(),
                    },
                );
                Some(BackfillStep::Retrying {
                    attempt: self.retries,
                    delay,
                    error: message,
                })
            }
            Err(error) => {
                self.record_attempts(&batch);
                self.finished = true;
                let message = error.to_string();
                self.summary.error = Some(message.clone());
                tracing::error!(error = %message, "Backfill stopped");
                emit(
                    self.on_progress.as_ref(),
                    SyncProgress::BackfillFailed { error: message },
                );
                Some(BackfillStep::Failed { error })
            }
        }
    }

    /// Drive the backfill to the end.
    pub async fn run(mut self) -> BackfillSummary {
        while self.next().await.is_some() {}
        self.summary
    }
}
