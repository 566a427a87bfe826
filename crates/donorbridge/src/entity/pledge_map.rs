//! PledgeMap entity - links a source subscription to its destination pledge.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per subscription. `subscription_id` carries a unique index, so a
/// second pledge for the same subscription can never be recorded.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pledge_map")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Source subscription id.
    #[sea_orm(unique)]
    pub subscription_id: String,

    /// Destination pledge all of the subscription's gifts point at.
    pub dest_pledge_id: i64,

    /// Destination donor the pledge was opened for.
    pub dest_donor_id: i64,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
