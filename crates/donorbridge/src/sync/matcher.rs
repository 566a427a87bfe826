//! Donor identity matching by email.

use crate::destination::{DestinationClient, DestinationId};
use crate::entity::donor_action::DonorAction;
use crate::source::DonorContact;

use super::errors::MatchFailure;

/// A resolved destination donor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedDonor {
    pub donor_id: DestinationId,
    pub action: DonorAction,
}

/// Resolves source donors to destination donors by exact email.
///
/// There is no fuzzy matching: a donor who changed email becomes a new
/// destination donor.
#[derive(Debug)]
pub struct DonorMatcher<'a, D: ?Sized> {
    destination: &'a D,
}

impl<'a, D: DestinationClient + ?Sized> DonorMatcher<'a, D> {
    pub fn new(destination: &'a D) -> Self {
        Self { destination }
    }

    /// Look up without creating.
    pub async fn lookup(&self, email: &str) -> Result<Option<DestinationId>, MatchFailure> {
        let email = normalize(email);
        Ok(self.destination.find_donor(&email).await?)
    }

    /// Return the first destination donor with this email, creating one from
    /// `contact` if none exists.
    pub async fn resolve(
        &self,
        email: &str,
        contact: &DonorContact,
    ) -> Result<MatchedDonor, MatchFailure> {
        let email = normalize(email);

        if let Some(donor_id) = self.destination.find_donor(&email).await? {
            tracing::debug!(donor_id, "Matched existing donor");
            return Ok(MatchedDonor {
                donor_id,
                action: DonorAction::Matched,
            });
        }

        let contact = DonorContact {
            email,
            ..contact.clone()
        };
        let donor_id = self.destination.create_donor(&contact).await?;
        tracing::info!(donor_id, "Created destination donor");
        Ok(MatchedDonor {
            donor_id,
            action: DonorAction::Created,
        })
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
