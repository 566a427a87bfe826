//! Dry run of the next backfill batch.
//!
//! Runs the same checks as a real attempt but only reads: donors are looked
//! up, pledge mappings are consulted, nothing is created and nothing is
//! logged. Items earlier in the preview count as done for the ones after
//! them, so two donations from one new donor show one creation.

use std::collections::{HashMap, HashSet};

use crate::destination::{DestinationClient, DestinationId, short_error_message};
use crate::entity::donor_action::DonorAction;
use crate::pledge::{PledgeLinker, PledgePlan};
use crate::source::Donation;

use super::engine::{subscription_of, validate};
use super::matcher::DonorMatcher;
use super::types::{PledgeAction, PreviewItem, PreviewStatus};

/// What earlier items of this preview would have done.
#[derive(Debug, Default)]
struct Planned {
    /// Email to existing donor id, or `None` for a donor an earlier item creates.
    donors: HashMap<String, Option<DestinationId>>,
    subscriptions: HashSet<String>,
}

pub(crate) async fn preview<D: DestinationClient + ?Sized>(
    destination: &D,
    linker: &PledgeLinker,
    donations: &[Donation],
) -> Vec<PreviewItem> {
    let matcher = DonorMatcher::new(destination);
    let mut planned = Planned::default();
    let mut items = Vec::with_capacity(donations.len());

    for donation in donations {
        let mut item = PreviewItem {
            donation_id: donation.id,
            donation_type: donation.donation_type,
            amount: donation.amount,
            name: donation.donor.full_name(),
            email: donation.donor.email.trim().to_string(),
            donor_action: None,
            dest_donor_id: None,
            pledge_action: PledgeAction::None,
            status: PreviewStatus::WouldSync,
            message: None,
        };

        let email = match validate(donation) {
            Ok(email) => email,
            Err(reason) => {
                item.status = PreviewStatus::WouldSkip;
                item.message = Some(reason.to_string());
                items.push(item);
                continue;
            }
        };
        item.email.clone_from(&email);

        let subscription_id = if donation.donation_type.is_recurring() {
            match subscription_of(donation) {
                Some(subscription_id) => Some(subscription_id),
                None => {
                    item.status = PreviewStatus::WouldFail;
                    item.message = Some("Recurring donation has no subscription id".to_string());
                    items.push(item);
                    continue;
                }
            }
        } else {
            None
        };

        match planned.donors.get(&email) {
            Some(known) => {
                item.donor_action = Some(DonorAction::Matched);
                item.dest_donor_id = *known;
            }
            None => match matcher.lookup(&email).await {
                Ok(Some(donor_id)) => {
                    item.donor_action = Some(DonorAction::Matched);
                    item.dest_donor_id = Some(donor_id);
                    planned.donors.insert(email.clone(), Some(donor_id));
                }
                Ok(None) => {
                    item.donor_action = Some(DonorAction::Created);
                    planned.donors.insert(email.clone(), None);
                }
                Err(e) => {
                    item.status = PreviewStatus::WouldFail;
                    item.message = Some(short_error_message(&e));
                    items.push(item);
                    continue;
                }
            },
        }

        if let Some(subscription_id) = subscription_id {
            if planned.subscriptions.contains(subscription_id) {
                item.pledge_action = PledgeAction::Reuse { pledge_id: None };
            } else {
                match linker.plan(subscription_id).await {
                    Ok(PledgePlan::Reuse { pledge_id }) => {
                        item.pledge_action = PledgeAction::Reuse {
                            pledge_id: Some(pledge_id),
                        };
                    }
                    Ok(PledgePlan::Create) => {
                        item.pledge_action = PledgeAction::Create;
                        planned.subscriptions.insert(subscription_id.to_string());
                    }
                    Err(e) => {
                        item.status = PreviewStatus::WouldFail;
                        item.message = Some(short_error_message(&e));
                    }
                }
            }
        }

        items.push(item);
    }

    items
}
