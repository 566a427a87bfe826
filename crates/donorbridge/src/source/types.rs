use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entity::donation_type::DonationType;

use super::errors::Result;

/// Source donation id. Globally unique and immutable.
pub type DonationId = i64;

/// Payment status on the source platform.
///
/// Only completed donations are delivered. Everything else is skipped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    #[default]
    Completed,
    Pending,
    Preapproval,
    Failed,
    Refunded,
    Cancelled,
    Abandoned,
    Revoked,
}

impl DonationStatus {
    #[inline]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Preapproval => "preapproval",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
            Self::Abandoned => "abandoned",
            Self::Revoked => "revoked",
        }
    }

    /// What the status means for the payment, for operators.
    pub fn meaning(self) -> &'static str {
        match self {
            Self::Completed => "Payment completed",
            Self::Pending => "Payment initiated but not yet confirmed",
            Self::Preapproval => "Pre-approved but not yet charged",
            Self::Failed => "Payment was attempted but declined or errored",
            Self::Refunded => "Payment was refunded after completion",
            Self::Cancelled => "Donation was cancelled",
            Self::Abandoned => "Donor started checkout but never paid",
            Self::Revoked => "Donation access was revoked",
        }
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Donor details carried on a donation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DonorContact {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl DonorContact {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }

    /// "First Last", trimmed. Empty when both parts are blank.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// The email trimmed and lower-cased, or `None` if it is not usable for matching.
    pub fn normalized_email(&self) -> Option<String> {
        let email = self.email.trim().to_ascii_lowercase();
        is_valid_email(&email).then_some(email)
    }
}

/// A single payment event on the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    pub donation_type: DonationType,
    pub amount: Decimal,
    pub donor: DonorContact,
    /// Donor id on the source platform, when it has one.
    #[serde(default)]
    pub source_donor_id: Option<i64>,
    /// Payment gateway id (e.g. "stripe", "paypal").
    #[serde(default)]
    pub gateway: String,
    /// Present for subscription payments.
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    /// Amount in minor units, rounded half away from zero to whole cents.
    pub fn amount_cents(&self) -> i64 {
        use rust_decimal::RoundingStrategy;
        use rust_decimal::prelude::ToPrimitive;

        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(i64::MAX)
    }
}

/// A donor record on the source platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDonor {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl SourceDonor {
    pub fn contact(&self) -> DonorContact {
        DonorContact::new(&self.first_name, &self.last_name, &self.email)
    }
}

/// Read-only access to the donation source.
#[async_trait]
pub trait DonationSource: Send + Sync {
    /// Look up one donation by id.
    async fn fetch_by_id(&self, id: DonationId) -> Result<Option<Donation>>;

    /// Completed donations with `id > after`, ascending by id, at most `limit`.
    async fn fetch_completed(
        &self,
        after: Option<DonationId>,
        limit: u64,
    ) -> Result<Vec<Donation>>;

    /// Every donor known to the source, ascending by id.
    async fn list_donors(&self) -> Result<Vec<SourceDonor>>;

    /// Number of donations per payment status, completed ones included.
    /// Statuses with no donations may be absent.
    async fn count_by_status(&self) -> Result<BTreeMap<DonationStatus, u64>>;
}

#[async_trait]
impl<T: DonationSource + ?Sized> DonationSource for Arc<T> {
    async fn fetch_by_id(&self, id: DonationId) -> Result<Option<Donation>> {
        (**self).fetch_by_id(id).await
    }

    async fn fetch_completed(
        &self,
        after: Option<DonationId>,
        limit: u64,
    ) -> Result<Vec<Donation>> {
        (**self).fetch_completed(after, limit).await
    }

    async fn list_donors(&self) -> Result<Vec<SourceDonor>> {
        (**self).list_donors().await
    }

    async fn count_by_status(&self) -> Result<BTreeMap<DonationStatus, u64>> {
        (**self).count_by_status().await
    }
}

/// Loose email check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_email_trims_and_lowercases() {
        let contact = DonorContact::new("Ada", "Lovelace", "  Ada@Example.COM ");
        assert_eq!(
            contact.normalized_email().as_deref(),
            Some("ada@example.com")
        );
    }

    #[test]
    fn normalized_email_rejects_unusable_addresses() {
        for email in ["", "   ", "no-at-sign", "@example.com", "a@b", "a@@b.com", "a b@c.com"] {
            let contact = DonorContact::new("", "", email);
            assert_eq!(contact.normalized_email(), None, "accepted {email:?}");
        }
    }

    #[test]
    fn full_name_skips_blank_parts() {
        assert_eq!(DonorContact::new("Ada", "", "").full_name(), "Ada");
        assert_eq!(DonorContact::new(" Ada ", "Lovelace", "").full_name(), "Ada Lovelace");
        assert_eq!(DonorContact::default().full_name(), "");
    }

    #[test]
    fn amount_cents_rounds_to_whole_cents() {
        let donation = Donation {
            id: 1,
            donation_type: DonationType::Single,
            amount: Decimal::new(10005, 3),
            donor: DonorContact::default(),
            source_donor_id: None,
            gateway: String::new(),
            subscription_id: None,
            status: DonationStatus::Completed,
            created_at: Utc::now(),
        };
        assert_eq!(donation.amount_cents(), 1001);
    }

    #[test]
    fn donation_status_defaults_to_completed() {
        assert_eq!(DonationStatus::default(), DonationStatus::Completed);
        assert!(DonationStatus::Completed.is_completed());
        assert!(!DonationStatus::Refunded.is_completed());
    }

    #[test]
    fn every_status_has_a_meaning() {
        let statuses = [
            DonationStatus::Completed,
            DonationStatus::Pending,
            DonationStatus::Preapproval,
            DonationStatus::Failed,
            DonationStatus::Refunded,
            DonationStatus::Cancelled,
            DonationStatus::Abandoned,
            DonationStatus::Revoked,
        ];
        for status in statuses {
            assert!(!status.meaning().is_empty(), "{status}");
        }
        assert_eq!(
            DonationStatus::Preapproval.meaning(),
            "Pre-approved but not yet charged"
        );
    }
}
