//! Outcome of a single sync attempt.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "error")]
    Error,
    /// Nothing was sent. Skips never change a donation's effective state.
    #[sea_orm(string_value = "skipped")]
    Skipped,
}

impl SyncStatus {
    /// Whether this outcome counts toward a donation's effective state.
    #[inline]
    pub fn is_delivery_outcome(self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Error => write!(f, "error"),
            SyncStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_is_not_a_delivery_outcome() {
        assert!(SyncStatus::Success.is_delivery_outcome());
        assert!(SyncStatus::Error.is_delivery_outcome());
        assert!(!SyncStatus::Skipped.is_delivery_outcome());
    }

    #[test]
    fn display_outputs_expected_strings() {
        assert_eq!(SyncStatus::Success.to_string(), "success");
        assert_eq!(SyncStatus::Error.to_string(), "error");
        assert_eq!(SyncStatus::Skipped.to_string(), "skipped");
    }
}
