//! Common re-exports for convenient entity usage.

pub use super::donation_type::DonationType;
pub use super::donor_action::DonorAction;
pub use super::pledge_map::{
    ActiveModel as PledgeMapActiveModel, Column as PledgeMapColumn, Entity as PledgeMap,
    Model as PledgeMapModel,
};
pub use super::sync_log::{
    ActiveModel as SyncLogActiveModel, Column as SyncLogColumn, Entity as SyncLog,
    Model as SyncLogModel,
};
pub use super::sync_status::SyncStatus;
