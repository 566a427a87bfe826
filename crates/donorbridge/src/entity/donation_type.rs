//! Kind of donation as recorded by the source platform.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a donation is a one-off gift or a payment of a recurring plan.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum DonationType {
    #[sea_orm(string_value = "single")]
    Single,
    /// First payment of a subscription.
    #[sea_orm(string_value = "subscription_initial")]
    SubscriptionInitial,
    /// Any later payment of a subscription.
    #[sea_orm(string_value = "renewal")]
    Renewal,
}

impl DonationType {
    /// True for both the first and the renewal payments of a subscription.
    #[inline]
    pub fn is_recurring(self) -> bool {
        matches!(self, Self::SubscriptionInitial | Self::Renewal)
    }

    /// Short label used in tables and exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::SubscriptionInitial => "subscription_initial",
            Self::Renewal => "renewal",
        }
    }
}

impl std::fmt::Display for DonationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_subscription_payments_are_recurring() {
        assert!(!DonationType::Single.is_recurring());
        assert!(DonationType::SubscriptionInitial.is_recurring());
        assert!(DonationType::Renewal.is_recurring());
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&DonationType::SubscriptionInitial).unwrap();
        assert_eq!(json, "\"subscription_initial\"");

        let parsed: DonationType = serde_json::from_str("\"renewal\"").unwrap();
        assert_eq!(parsed, DonationType::Renewal);
    }

    #[test]
    fn display_matches_stored_value() {
        assert_eq!(DonationType::Single.to_string(), "single");
        assert_eq!(
            DonationType::SubscriptionInitial.to_string(),
            "subscription_initial"
        );
    }
}
