//! SeaORM entity definitions for the sync database schema.

pub mod donation_type;
pub mod donor_action;
pub mod pledge_map;
pub mod prelude;
pub mod sync_log;
pub mod sync_status;
