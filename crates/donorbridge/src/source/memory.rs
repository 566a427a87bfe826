use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;
use super::types::{Donation, DonationId, DonationSource, DonationStatus, SourceDonor};

/// On-disk export of the donation platform.
///
/// ```json
/// {
///   "donations": [
///     {"id": 1, "donation_type": "single", "amount": "25.00",
///      "donor": {"first_name": "Ada", "last_name": "L", "email": "a@example.com"},
///      "gateway": "stripe", "created_at": "2026-01-02T03:04:05Z"}
///   ],
///   "donors": []
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceExport {
    #[serde(default)]
    pub donations: Vec<Donation>,
    /// Optional. When empty, donors are derived from the donations.
    #[serde(default)]
    pub donors: Vec<SourceDonor>,
}

/// A donation source held in memory, keyed by donation id.
///
/// Donations can be added after construction, which mirrors new payments
/// completing on the platform while a backfill is running.
#[derive(Debug, Default)]
pub struct InMemorySource {
    donations: RwLock<BTreeMap<DonationId, Donation>>,
    donors: RwLock<Vec<SourceDonor>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from a set of donations.
    pub fn with_donations(donations: impl IntoIterator<Item = Donation>) -> Self {
        let source = Self::new();
        for donation in donations {
            source.insert(donation);
        }
        source
    }

    /// Build a source from a parsed export.
    pub fn from_export(export: SourceExport) -> Self {
        let source = Self::with_donations(export.donations);
        *source.donors.write().unwrap_or_else(|e| e.into_inner()) = export.donors;
        source
    }

    /// Load a JSON export from disk.
    ///
    /// # Errors
    /// Returns `SourceError::Io` if the file cannot be read and
    /// `SourceError::Malformed` if it is not a valid export.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let export: SourceExport = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            donations = export.donations.len(),
            donors = export.donors.len(),
            "Loaded source export"
        );
        Ok(Self::from_export(export))
    }

    /// Add or replace a donation.
    pub fn insert(&self, donation: Donation) {
        self.donations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(donation.id, donation);
    }

    /// Number of donations held, regardless of status.
    pub fn len(&self) -> usize {
        self.donations.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Donors derived from donations, one per source donor id (or email when
    /// the donation carries no donor id).
    fn derived_donors(&self) -> Vec<SourceDonor> {
        let donations = self.donations.read().unwrap_or_else(|e| e.into_inner());
        let mut seen_ids = BTreeSet::new();
        let mut seen_emails = BTreeSet::new();
        let mut donors = Vec::new();
        let mut next_anonymous_id = -1;

        for donation in donations.values() {
            let email = donation.donor.email.trim().to_ascii_lowercase();
            let id = match donation.source_donor_id {
                Some(id) => {
                    if !seen_ids.insert(id) {
                        continue;
                    }
                    id
                }
                None => {
                    if !seen_emails.insert(email.clone()) {
                        continue;
                    }
                    let id = next_anonymous_id;
                    next_anonymous_id -= 1;
                    id
                }
            };
            donors.push(SourceDonor {
                id,
                first_name: donation.donor.first_name.clone(),
                last_name: donation.donor.last_name.clone(),
                email: donation.donor.email.clone(),
            });
        }

        donors.sort_by_key(|d| d.id);
        donors
    }
}

#[async_trait]
impl DonationSource for InMemorySource {
    async fn fetch_by_id(&self, id: DonationId) -> Result<Option<Donation>> {
        let donations = self.donations.read().unwrap_or_else(|e| e.into_inner());
        Ok(donations.get(&id).cloned())
    }

    async fn fetch_completed(
        &self,
        after: Option<DonationId>,
        limit: u64,
    ) -> Result<Vec<Donation>> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let donations = self.donations.read().unwrap_or_else(|e| e.into_inner());
        let lower = after.map_or(DonationId::MIN, |a| a.saturating_add(1));

        Ok(donations
            .range(lower..)
            .map(|(_, d)| d)
            .filter(|d| d.status.is_completed())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_donors(&self) -> Result<Vec<SourceDonor>> {
        let explicit = self.donors.read().unwrap_or_else(|e| e.into_inner()).clone();
        if !explicit.is_empty() {
            let mut donors = explicit;
            donors.sort_by_key(|d| d.id);
            return Ok(donors);
        }
        Ok(self.derived_donors())
    }

    async fn count_by_status(&self) -> Result<BTreeMap<DonationStatus, u64>> {
        let donations = self.donations.read().unwrap_or_else(|e| e.into_inner());
        let mut counts = BTreeMap::new();
        for donation in donations.values() {
            *counts.entry(donation.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
