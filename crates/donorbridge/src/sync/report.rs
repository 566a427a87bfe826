//! Donor match report.

use crate::destination::{DestinationClient, short_error_message};
use crate::source::SourceDonor;

use super::matcher::DonorMatcher;
use super::types::{MatchAction, MatchReport, MatchReportRow};

/// Look up every source donor on the destination without creating anything.
///
/// A failed lookup marks that donor's row and the report continues.
pub(crate) async fn build<D: DestinationClient + ?Sized>(
    destination: &D,
    donors: &[SourceDonor],
) -> MatchReport {
    let matcher = DonorMatcher::new(destination);
    let mut report = MatchReport::default();

    for donor in donors {
        let contact = donor.contact();
        let mut row = MatchReportRow {
            source_donor_id: donor.id,
            name: contact.full_name(),
            email: contact.email.trim().to_string(),
            dest_donor_id: None,
            action: MatchAction::Skip,
            message: None,
        };

        match contact.normalized_email() {
            None => row.message = Some("Missing or invalid email".to_string()),
            Some(email) => match matcher.lookup(&email).await {
                Ok(Some(donor_id)) => {
                    row.action = MatchAction::Match;
                    row.dest_donor_id = Some(donor_id);
                }
                Ok(None) => row.action = MatchAction::Create,
                Err(e) => {
                    tracing::warn!(source_donor_id = donor.id, error = %e, "Donor lookup failed");
                    row.action = MatchAction::Error;
                    row.message = Some(short_error_message(&e));
                }
            },
        }

        report.push(row);
    }

    tracing::info!(
        total = report.total,
        matched = report.matched,
        new = report.new,
        skipped = report.skipped,
        errors = report.errors,
        "Match report built"
    );
    report
}
