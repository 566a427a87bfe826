use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::source::DonorContact;

use super::errors::Result;

/// Record id assigned by the destination (donor, gift or pledge).
pub type DestinationId = i64;

/// Code tables that can be validated against the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeField {
    GlCode,
    Campaign,
    SolicitCode,
    SubSolicitCode,
    GiftType,
}

impl CodeField {
    /// Field name as the destination's code table knows it.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::GlCode => "GL_CODE",
            Self::Campaign => "CAMPAIGN",
            Self::SolicitCode => "SOLICIT_CODE",
            Self::SubSolicitCode => "SUB_SOLICIT_CODE",
            Self::GiftType => "GIFT_TYPE",
        }
    }

    /// Human label for reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::GlCode => "GL code",
            Self::Campaign => "Campaign",
            Self::SolicitCode => "Solicit code",
            Self::SubSolicitCode => "Sub-solicit code",
            Self::GiftType => "Gift type",
        }
    }
}

impl std::fmt::Display for CodeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything needed to create one gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftPayload {
    pub donor_id: DestinationId,
    /// Passed through unchanged. Formatting happens in the client.
    pub amount: Decimal,
    pub gift_date: NaiveDate,
    pub gl_code: String,
    pub campaign: Option<String>,
    pub solicit_code: Option<String>,
    /// `ONETIME` or `RECURRING`.
    pub sub_solicit_code: String,
    pub gift_type: String,
    pub pledge_id: Option<DestinationId>,
    /// Free-text reference back to the source donation.
    pub reference: String,
}

/// An open-ended pledge grouping the gifts of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PledgePayload {
    pub donor_id: DestinationId,
    /// Always zero: subscriptions run until cancelled.
    pub total: Decimal,
    /// Amount of each installment.
    pub bill_amount: Decimal,
    pub start_date: NaiveDate,
    pub gl_code: String,
    pub campaign: Option<String>,
    pub solicit_code: Option<String>,
    pub reference: String,
}

impl PledgePayload {
    /// Build an open-ended pledge (total of zero).
    pub fn open_ended(
        donor_id: DestinationId,
        bill_amount: Decimal,
        start_date: NaiveDate,
        gl_code: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            donor_id,
            total: Decimal::ZERO,
            bill_amount,
            start_date,
            gl_code: gl_code.into(),
            campaign: None,
            solicit_code: None,
            reference: reference.into(),
        }
    }
}

/// Result of a connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub ok: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Operations the sync engine needs from the destination CRM.
///
/// Every method is a network call and may fail with a transport error, which
/// is distinct from an application-level "not found" (`Ok(None)` / `Ok(false)`).
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Find a donor whose email equals `email` (already normalized).
    /// Returns the first match.
    async fn find_donor(&self, email: &str) -> Result<Option<DestinationId>>;

    /// Create a donor record.
    async fn create_donor(&self, contact: &DonorContact) -> Result<DestinationId>;

    /// Create a gift record.
    async fn create_gift(&self, gift: &GiftPayload) -> Result<DestinationId>;

    /// Create a pledge record.
    async fn create_pledge(&self, pledge: &PledgePayload) -> Result<DestinationId>;

    /// Check that `value` exists in the code table for `field`.
    async fn validate_code(&self, field: CodeField, value: &str) -> Result<bool>;

    /// Check credentials and reachability.
    async fn test_connection(&self) -> Result<ConnectionStatus>;
}

#[async_trait]
impl<T: DestinationClient + ?Sized> DestinationClient for Arc<T> {
    async fn find_donor(&self, email: &str) -> Result<Option<DestinationId>> {
        (**self).find_donor(email).await
    }

    async fn create_donor(&self, contact: &DonorContact) -> Result<DestinationId> {
        (**self).create_donor(contact).await
    }

    async fn create_gift(&self, gift: &GiftPayload) -> Result<DestinationId> {
        (**self).create_gift(gift).await
    }

    async fn create_pledge(&self, pledge: &PledgePayload) -> Result<DestinationId> {
        (**self).create_pledge(pledge).await
    }

    async fn validate_code(&self, field: CodeField, value: &str) -> Result<bool> {
        (**self).validate_code(field, value).await
    }

    async fn test_connection(&self) -> Result<ConnectionStatus> {
        (**self).test_connection().await
    }
}
