//! Donation sync: per-donation attempts, batches and the backfill.
//!
//! # Module Structure
//!
//! - [`types`] - Result types: `SyncResult`, `BatchResult`, `PreviewResult`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`engine`] - The orchestrator: `SyncEngine`
//! - [`backfill`] - Batch-after-batch coordinator with retry and cancellation
//! - `matcher` - Donor identity by email
//! - `translate` - Donation to gift and pledge payloads
//!
//! # Example
//!
//! ```ignore
//! use donorbridge::sync::{SyncEngine, SyncProgress};
//!
//! let engine = SyncEngine::new(Arc::new(db), source, destination, settings);
//! let mut backfill = engine.backfill().with_progress(Box::new(|event| {
//!     if let SyncProgress::DonationFailed { donation_id, error, .. } = event {
//!         eprintln!("#{donation_id}: {error}");
//!     }
//! }));
//! let cancel = backfill.canceller();
//! while let Some(step) = backfill.next().await {
//!     // render step
//! }
//! ```

pub mod backfill;
pub mod engine;
mod errors;
mod matcher;
mod preview;
mod progress;
mod report;
mod translate;
mod types;
mod unsynced;

// Re-export types
pub use types::{
    BackfillOverview, BatchRequest, BatchResult, CodeCheck, ExcludedStatus, MatchAction,
    MatchReport, MatchReportRow, PledgeAction, PreviewItem, PreviewResult, PreviewStatus,
    SkipReason, SyncResult,
};

// Re-export constants
pub use types::{
    BATCH_TIMEOUT, DEFAULT_BATCH_SIZE, INTER_BATCH_DELAY, PREVIEW_BATCH_SIZE, UNSYNCED_PAGE_SIZE,
};

// Re-export errors
pub use errors::{AttemptError, MatchFailure, Result, SyncError};

// Re-export progress types
pub use progress::{ProgressCallback, SyncProgress, emit};

pub use backfill::{Backfill, BackfillCanceller, BackfillConfig, BackfillStep, BackfillSummary};
pub use engine::SyncEngine;
pub use matcher::{DonorMatcher, MatchedDonor};
pub use translate::{gift_reference, pledge_reference, sub_solicit_code, translate};
