//! SyncLog entity - one row per sync attempt.
//!
//! The table is append-only. A donation that was retried has several rows,
//! and the newest row whose status is a delivery outcome decides whether the
//! donation counts as synced.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::donation_type::DonationType;
use super::donor_action::DonorAction;
use super::sync_status::SyncStatus;

/// SyncLog model - the audit trail for every attempt to deliver a donation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_log")]
pub struct Model {
    /// Append order. Breaks ties between attempts with equal timestamps.
    #[sea_orm(primary_key)]
    pub id: i64,

    // ─── Source ──────────────────────────────────────────────────────────
    /// Source donation id.
    pub donation_id: i64,

    pub donation_type: DonationType,

    /// Donation amount in minor units (cents).
    pub amount_cents: i64,

    // ─── Destination ─────────────────────────────────────────────────────
    /// How the donor was resolved. Empty when the attempt never reached matching.
    pub donor_action: Option<DonorAction>,

    pub dest_donor_id: Option<i64>,

    pub dest_gift_id: Option<i64>,

    pub dest_pledge_id: Option<i64>,

    /// True only on the attempt that opened the pledge for its subscription.
    pub pledge_created: bool,

    // ─── Outcome ─────────────────────────────────────────────────────────
    pub status: SyncStatus,

    /// Error or skip reason.
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// When the attempt finished.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True if this entry delivered the donation.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// Amount as a two-place decimal.
    pub fn amount(&self) -> rust_decimal::Decimal {
        rust_decimal::Decimal::new(self.amount_cents, 2)
    }
}
