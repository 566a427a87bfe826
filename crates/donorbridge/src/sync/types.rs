//! Engine result types and constants.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::destination::{CodeField, DestinationId};
use crate::entity::donation_type::DonationType;
use crate::entity::donor_action::DonorAction;
use crate::entity::sync_log::Model as LogEntry;
use crate::entity::sync_status::SyncStatus;
use crate::source::{DonationId, DonationStatus};

/// Donations per backfill batch.
pub const DEFAULT_BATCH_SIZE: u64 = 5;

/// Donations per preview.
pub const PREVIEW_BATCH_SIZE: u64 = 50;

/// Upper bound on one batch call.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Pause between successful batches.
pub const INTER_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Page size when scanning the source for unsynced donations.
pub const UNSYNCED_PAGE_SIZE: u64 = 100;

/// Why a donation was not sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySynced,
    NotCompleted { status: DonationStatus },
    NonPositiveAmount,
    InvalidEmail,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySynced => f.write_str("Already synced"),
            Self::NotCompleted { status } => write!(f, "Donation is {status}, not completed"),
            Self::NonPositiveAmount => f.write_str("Amount is zero or negative"),
            Self::InvalidEmail => f.write_str("Missing or invalid donor email"),
        }
    }
}

/// Outcome of one attempt, mirroring the log entry it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Id of the log entry.
    pub log_id: i64,
    pub donation_id: DonationId,
    pub donation_type: DonationType,
    pub amount: Decimal,
    pub status: SyncStatus,
    pub donor_action: Option<DonorAction>,
    pub dest_donor_id: Option<DestinationId>,
    pub dest_gift_id: Option<DestinationId>,
    pub dest_pledge_id: Option<DestinationId>,
    pub pledge_created: bool,
    /// Error or skip reason.
    pub message: Option<String>,
    /// The error came from transport; retrying later may succeed.
    pub transient: bool,
}

impl SyncResult {
    pub(crate) fn from_entry(entry: &LogEntry, transient: bool) -> Self {
        Self {
            log_id: entry.id,
            donation_id: entry.donation_id,
            donation_type: entry.donation_type,
            amount: entry.amount(),
            status: entry.status,
            donor_action: entry.donor_action,
            dest_donor_id: entry.dest_donor_id,
            dest_gift_id: entry.dest_gift_id,
            dest_pledge_id: entry.dest_pledge_id,
            pledge_created: entry.pledge_created,
            message: entry.error_message.clone(),
            transient,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.status == SyncStatus::Error
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        self.status == SyncStatus::Skipped
    }
}

/// Which slice of the unsynced set a batch takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRequest {
    pub batch_size: u64,
    /// Only donations with a greater id are selected.
    pub after: Option<DonationId>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            after: None,
        }
    }
}

impl BatchRequest {
    pub fn new(batch_size: u64) -> Self {
        Self {
            batch_size,
            after: None,
        }
    }

    pub fn after(mut self, cursor: Option<DonationId>) -> Self {
        self.after = cursor;
        self
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Donations attempted in this batch.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Unsynced donations after the batch. Advisory: other writers (real-time
    /// sync, new payments) move it.
    pub total_unsynced: u64,
    /// Unsynced donations beyond `cursor`.
    pub remaining: u64,
    pub has_more: bool,
    /// Highest donation id attempted, or the request's cursor if none was.
    pub cursor: Option<DonationId>,
    pub items: Vec<SyncResult>,
}

/// What a preview expects to happen with a subscription's pledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PledgeAction {
    /// One-time gift.
    None,
    Create,
    /// Existing pledge, or one an earlier item of the same preview would open
    /// (`pledge_id` unknown).
    Reuse { pledge_id: Option<DestinationId> },
}

impl std::fmt::Display for PledgeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Create => f.write_str("create"),
            Self::Reuse {
                pledge_id: Some(id),
            } => write!(f, "reuse #{id}"),
            Self::Reuse { pledge_id: None } => f.write_str("reuse"),
        }
    }
}

/// Expected outcome of a previewed donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    WouldSync,
    WouldSkip,
    WouldFail,
}

impl std::fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::WouldSync => "would sync",
            Self::WouldSkip => "would skip",
            Self::WouldFail => "would fail",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub donation_id: DonationId,
    pub donation_type: DonationType,
    pub amount: Decimal,
    pub name: String,
    pub email: String,
    pub donor_action: Option<DonorAction>,
    /// Known only when the donor already exists.
    pub dest_donor_id: Option<DestinationId>,
    pub pledge_action: PledgeAction,
    pub status: PreviewStatus,
    pub message: Option<String>,
}

/// A dry run over the next unsynced donations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewResult {
    pub processed: usize,
    pub total_unsynced: u64,
    pub has_more: bool,
    pub items: Vec<PreviewItem>,
}

/// Donations the source holds in a status that is never synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExcludedStatus {
    pub status: DonationStatus,
    pub count: u64,
    pub meaning: &'static str,
}

/// Where the backfill stands: completed donations split into synced and
/// remaining, plus what the source holds that will never be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillOverview {
    pub completed: u64,
    pub synced: u64,
    pub remaining: u64,
    /// Largest count first.
    pub excluded: Vec<ExcludedStatus>,
}

impl BackfillOverview {
    pub(crate) fn new(counts: &BTreeMap<DonationStatus, u64>, remaining: u64) -> Self {
        let completed = counts
            .get(&DonationStatus::Completed)
            .copied()
            .unwrap_or_default();

        let mut excluded: Vec<ExcludedStatus> = counts
            .iter()
            .filter(|(status, count)| !status.is_completed() && **count > 0)
            .map(|(&status, &count)| ExcludedStatus {
                status,
                count,
                meaning: status.meaning(),
            })
            .collect();
        excluded.sort_by(|a, b| b.count.cmp(&a.count).then(a.status.cmp(&b.status)));

        Self {
            completed,
            synced: completed.saturating_sub(remaining),
            remaining,
            excluded,
        }
    }

    pub fn excluded_total(&self) -> u64 {
        self.excluded.iter().map(|e| e.count).sum()
    }
}

/// Outcome of looking up one source donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    /// Exists on the destination.
    Match,
    /// Would be created on first sync.
    Create,
    /// Unusable email; the donor's donations would be skipped.
    Skip,
    /// The lookup failed.
    Error,
}

impl std::fmt::Display for MatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Match => "match",
            Self::Create => "create",
            Self::Skip => "skip",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReportRow {
    pub source_donor_id: i64,
    pub name: String,
    pub email: String,
    pub dest_donor_id: Option<DestinationId>,
    pub action: MatchAction,
    pub message: Option<String>,
}

/// Read-only comparison of source donors against the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub total: usize,
    pub matched: usize,
    pub new: usize,
    pub skipped: usize,
    pub errors: usize,
    pub rows: Vec<MatchReportRow>,
}

impl MatchReport {
    pub(crate) fn push(&mut self, row: MatchReportRow) {
        self.total += 1;
        match row.action {
            MatchAction::Match => self.matched += 1,
            MatchAction::Create => self.new += 1,
            MatchAction::Skip => self.skipped += 1,
            MatchAction::Error => self.errors += 1,
        }
        self.rows.push(row);
    }
}

/// Result of checking one configured code against the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeCheck {
    pub field: CodeField,
    pub value: String,
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_defaults_to_five_from_the_start() {
        let request = BatchRequest::default();
        assert_eq!(request.batch_size, 5);
        assert_eq!(request.after, None);
        assert_eq!(BatchRequest::new(3).after(Some(9)).after, Some(9));
    }

    #[test]
    fn skip_reasons_read_as_sentences() {
        assert_eq!(SkipReason::AlreadySynced.to_string(), "Already synced");
        assert_eq!(
            SkipReason::NotCompleted {
                status: DonationStatus::Refunded
            }
            .to_string(),
            "Donation is refunded, not completed"
        );
    }

    #[test]
    fn match_report_counts_actions() {
        let row = |action| MatchReportRow {
            source_donor_id: 1,
            name: String::new(),
            email: String::new(),
            dest_donor_id: None,
            action,
            message: None,
        };
        let mut report = MatchReport::default();
        report.push(row(MatchAction::Match));
        report.push(row(MatchAction::Create));
        report.push(row(MatchAction::Create));
        report.push(row(MatchAction::Error));

        assert_eq!(report.total, 4);
        assert_eq!(report.matched, 1);
        assert_eq!(report.new, 2);
        assert_eq!(report.errors, 1);
    }

    #[test]
    fn overview_splits_completed_and_orders_exclusions_by_count() {
        let counts = BTreeMap::from([
            (DonationStatus::Completed, 10),
            (DonationStatus::Pending, 1),
            (DonationStatus::Refunded, 0),
            (DonationStatus::Abandoned, 4),
            (DonationStatus::Failed, 1),
        ]);

        let overview = BackfillOverview::new(&counts, 3);

        assert_eq!(overview.completed, 10);
        assert_eq!(overview.synced, 7);
        assert_eq!(overview.remaining, 3);
        assert_eq!(
            overview.excluded.iter().map(|e| e.status).collect::<Vec<_>>(),
            vec![
                DonationStatus::Abandoned,
                DonationStatus::Pending,
                DonationStatus::Failed
            ]
        );
        assert_eq!(overview.excluded_total(), 6);
        assert_eq!(overview.excluded[0].meaning, DonationStatus::Abandoned.meaning());
    }

    #[test]
    fn pledge_action_display() {
        assert_eq!(PledgeAction::Reuse { pledge_id: Some(7) }.to_string(), "reuse #7");
        assert_eq!(PledgeAction::Reuse { pledge_id: None }.to_string(), "reuse");
        assert_eq!(PledgeAction::Create.to_string(), "create");
    }
}
