use std::time::Duration;

use thiserror::Error;

use crate::destination::DestinationError;
use crate::log_store::LogStoreError;
use crate::pledge::PledgeError;
use crate::source::{DonationId, SourceError};

/// Donor lookup or creation failed.
#[derive(Debug, Error)]
#[error("Donor match failed: {0}")]
pub struct MatchFailure(#[from] pub DestinationError);

impl MatchFailure {
    pub fn is_transport(&self) -> bool {
        self.0.is_transport()
    }
}

/// Why one donation's attempt failed. Recorded on its log entry. Only a
/// transient failure stops the batch it happened in.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Match(#[from] MatchFailure),

    /// Subscription payment without a subscription id on the source.
    #[error("Recurring donation {donation_id} has no subscription id")]
    MissingSubscription { donation_id: DonationId },

    #[error(transparent)]
    Pledge(#[from] PledgeError),

    #[error("Gift creation failed: {0}")]
    Gift(DestinationError),
}

impl AttemptError {
    /// Whether the failure was in transport and a later attempt may succeed
    /// unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Match(e) => e.is_transport(),
            Self::Pledge(e) => e.is_transport(),
            Self::Gift(e) => e.is_transport(),
            Self::MissingSubscription { .. } => false,
        }
    }
}

/// Call-level failures of the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sync log error: {0}")]
    Log(#[from] LogStoreError),

    #[error("Donation {0} not found in source")]
    DonationNotFound(DonationId),

    #[error("Batch timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A destination transport failure stopped the batch. The donation's
    /// error entry is already written.
    #[error("Destination unavailable at donation {donation_id}: {message}")]
    Destination {
        donation_id: DonationId,
        message: String,
    },
}

impl SyncError {
    /// Whether the backfill should retry the whole batch.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Source(e) => e.is_transient(),
            Self::Timeout(_) | Self::Destination { .. } => true,
            Self::Log(_) | Self::DonationNotFound(_) => false,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_errors_follow_destination_classification() {
        let transport = AttemptError::Gift(DestinationError::network("reset"));
        let rejected = AttemptError::Gift(DestinationError::api("Invalid GL code"));
        let missing = AttemptError::MissingSubscription { donation_id: 3 };

        assert!(transport.is_transient());
        assert!(!rejected.is_transient());
        assert!(!missing.is_transient());
        assert!(AttemptError::from(MatchFailure(DestinationError::http(502, "x"))).is_transient());
    }

    #[test]
    fn transport_class_failures_are_retried() {
        assert!(SyncError::Timeout(Duration::from_secs(120)).is_transient());
        assert!(SyncError::from(SourceError::unavailable("down")).is_transient());
        assert!(SyncError::from(SourceError::malformed("bad json")).is_transient());
        assert!(
            SyncError::Destination {
                donation_id: 4,
                message: "Network error: reset".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn missing_data_and_log_failures_stop_the_backfill() {
        assert!(!SyncError::DonationNotFound(9).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "export.json");
        assert!(!SyncError::from(SourceError::from(io)).is_transient());
    }

    #[test]
    fn timeout_message_is_in_seconds() {
        assert_eq!(
            SyncError::Timeout(Duration::from_secs(120)).to_string(),
            "Batch timed out after 120s"
        );
    }
}
