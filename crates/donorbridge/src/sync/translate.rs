//! Donation to gift translation.
//!
//! Pure functions: no I/O, no clock. Everything a gift carries comes from the
//! donation, the settings, and the ids resolved earlier in the attempt.

use crate::destination::{DestinationId, GiftPayload, PledgePayload};
use crate::entity::donation_type::DonationType;
use crate::settings::{SUB_SOLICIT_ONETIME, SUB_SOLICIT_RECURRING, SyncSettings};
use crate::source::{Donation, DonationId};

/// Sub-solicit code for a donation type.
pub fn sub_solicit_code(donation_type: DonationType) -> &'static str {
    if donation_type.is_recurring() {
        SUB_SOLICIT_RECURRING
    } else {
        SUB_SOLICIT_ONETIME
    }
}

/// Reference written on the destination gift.
pub fn gift_reference(donation_id: DonationId) -> String {
    format!("Donation #{donation_id}")
}

/// Reference written on the destination pledge.
pub fn pledge_reference(subscription_id: &str) -> String {
    format!("Subscription {subscription_id}")
}

/// Build the gift for a donation.
pub fn translate(
    donation: &Donation,
    settings: &SyncSettings,
    donor_id: DestinationId,
    pledge_id: Option<DestinationId>,
) -> GiftPayload {
    GiftPayload {
        donor_id,
        amount: donation.amount,
        gift_date: donation.created_at.date_naive(),
        gl_code: settings.gl_code().to_string(),
        campaign: settings.campaign().map(str::to_string),
        solicit_code: settings.solicit_code().map(str::to_string),
        sub_solicit_code: sub_solicit_code(donation.donation_type).to_string(),
        gift_type: settings.gift_type_for(&donation.gateway).to_string(),
        pledge_id,
        reference: gift_reference(donation.id),
    }
}

/// Build the open-ended pledge for a subscription's first synced payment.
pub fn pledge_payload(
    donation: &Donation,
    subscription_id: &str,
    settings: &SyncSettings,
    donor_id: DestinationId,
) -> PledgePayload {
    PledgePayload {
        campaign: settings.campaign().map(str::to_string),
        solicit_code: settings.solicit_code().map(str::to_string),
        ..PledgePayload::open_ended(
            donor_id,
            donation.amount,
            donation.created_at.date_naive(),
            settings.gl_code(),
            pledge_reference(subscription_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::settings::UNMAPPED_GIFT_TYPE;
    use crate::testing::DonationBuilder;

    fn settings() -> SyncSettings {
        SyncSettings {
            default_gl_code: "GEN".to_string(),
            default_campaign: "SPRING".to_string(),
            gateway_map: BTreeMap::from([("stripe".to_string(), "CC".to_string())]),
            ..SyncSettings::default()
        }
    }

    #[test]
    fn single_gift_is_onetime() {
        let donation = DonationBuilder::single(1).cents(2500).build();
        let gift = translate(&donation, &settings(), 10, None);

        assert_eq!(gift.donor_id, 10);
        assert_eq!(gift.amount, Decimal::new(2500, 2));
        assert_eq!(gift.sub_solicit_code, "ONETIME");
        assert_eq!(gift.gl_code, "GEN");
        assert_eq!(gift.campaign.as_deref(), Some("SPRING"));
        assert_eq!(gift.solicit_code, None);
        assert_eq!(gift.gift_type, "CC");
        assert_eq!(gift.pledge_id, None);
        assert_eq!(gift.reference, "Donation #1");
        assert_eq!(gift.gift_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn subscription_gifts_are_recurring_and_carry_the_pledge() {
        for donation in [
            DonationBuilder::subscription_initial(2, "S1").build(),
            DonationBuilder::renewal(3, "S1").build(),
        ] {
            let gift = translate(&donation, &settings(), 10, Some(77));
            assert_eq!(gift.sub_solicit_code, "RECURRING");
            assert_eq!(gift.pledge_id, Some(77));
        }
    }

    #[test]
    fn unmapped_gateway_uses_sentinel_gift_type() {
        let donation = DonationBuilder::single(4).gateway("manual").build();
        let gift = translate(&donation, &settings(), 10, None);
        assert_eq!(gift.gift_type, UNMAPPED_GIFT_TYPE);
    }

    #[test]
    fn amount_is_passed_through_unrounded() {
        let donation = DonationBuilder::single(5)
            .amount(Decimal::new(100_005, 4))
            .build();
        let gift = translate(&donation, &settings(), 10, None);
        assert_eq!(gift.amount, Decimal::new(100_005, 4));
    }

    #[test]
    fn pledge_is_open_ended_with_configured_codes() {
        let donation = DonationBuilder::subscription_initial(2, "S1").cents(1000).build();
        let pledge = pledge_payload(&donation, "S1", &settings(), 10);

        assert_eq!(pledge.total, Decimal::ZERO);
        assert_eq!(pledge.bill_amount, Decimal::new(1000, 2));
        assert_eq!(pledge.gl_code, "GEN");
        assert_eq!(pledge.campaign.as_deref(), Some("SPRING"));
        assert_eq!(pledge.reference, "Subscription S1");
    }
}
