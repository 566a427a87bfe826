//! How a destination donor was resolved for a sync attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DonorAction {
    /// An existing destination donor had the same email.
    #[sea_orm(string_value = "matched")]
    Matched,
    /// No donor matched, a new one was created.
    #[sea_orm(string_value = "created")]
    Created,
}

impl std::fmt::Display for DonorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonorAction::Matched => write!(f, "matched"),
            DonorAction::Created => write!(f, "created"),
        }
    }
}
