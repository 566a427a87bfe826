//! Test doubles for the source and destination collaborators.
//!
//! Compiled for this crate's own tests and, behind the `test-util` feature,
//! for integration tests and downstream crates.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::destination::{
    CodeField, ConnectionStatus, DestinationClient, DestinationError, DestinationId, GiftPayload,
    PledgePayload, Result as DestinationResult,
};
use crate::entity::donation_type::DonationType;
use crate::source::{
    Donation, DonationId, DonationSource, DonationStatus, DonorContact, InMemorySource,
    Result as SourceResult, SourceDonor, SourceError,
};

// ─── Donation builder ────────────────────────────────────────────────────────

/// Builds [`Donation`] values with sensible defaults.
///
/// Defaults: completed, 25.00 via `stripe`, donor `donor{id}@example.com`,
/// created 2026-03-01 12:00 UTC.
#[derive(Debug, Clone)]
pub struct DonationBuilder {
    donation: Donation,
}

impl DonationBuilder {
    fn new(id: DonationId, donation_type: DonationType, subscription_id: Option<String>) -> Self {
        Self {
            donation: Donation {
                id,
                donation_type,
                amount: Decimal::new(2500, 2),
                donor: DonorContact::new("Donor", id.to_string(), format!("donor{id}@example.com")),
                source_donor_id: None,
                gateway: "stripe".to_string(),
                subscription_id,
                status: DonationStatus::Completed,
                created_at: fixed_time(),
            },
        }
    }

    pub fn single(id: DonationId) -> Self {
        Self::new(id, DonationType::Single, None)
    }

    pub fn subscription_initial(id: DonationId, subscription_id: &str) -> Self {
        Self::new(
            id,
            DonationType::SubscriptionInitial,
            Some(subscription_id.to_string()),
        )
    }

    pub fn renewal(id: DonationId, subscription_id: &str) -> Self {
        Self::new(id, DonationType::Renewal, Some(subscription_id.to_string()))
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.donation.amount = amount;
        self
    }

    /// Amount in cents, e.g. `cents(1000)` for 10.00.
    pub fn cents(self, cents: i64) -> Self {
        self.amount(Decimal::new(cents, 2))
    }

    pub fn donor(mut self, donor: DonorContact) -> Self {
        self.donation.donor = donor;
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.donation.donor.email = email.to_string();
        self
    }

    pub fn source_donor(mut self, id: i64) -> Self {
        self.donation.source_donor_id = Some(id);
        self
    }

    pub fn gateway(mut self, gateway: &str) -> Self {
        self.donation.gateway = gateway.to_string();
        self
    }

    pub fn status(mut self, status: DonationStatus) -> Self {
        self.donation.status = status;
        self
    }

    pub fn without_subscription(mut self) -> Self {
        self.donation.subscription_id = None;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.donation.created_at = created_at;
        self
    }

    pub fn build(self) -> Donation {
        self.donation
    }
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

// ─── Fake destination ────────────────────────────────────────────────────────

/// Destination operations, for injecting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    FindDonor,
    CreateDonor,
    CreateGift,
    CreatePledge,
    ValidateCode,
    TestConnection,
}

/// Number of calls per destination operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find_donor: usize,
    pub create_donor: usize,
    pub create_gift: usize,
    pub create_pledge: usize,
    pub validate_code: usize,
    pub test_connection: usize,
}

impl CallCounts {
    /// Calls that create records.
    pub fn writes(&self) -> usize {
        self.create_donor + self.create_gift + self.create_pledge
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedGift {
    pub id: DestinationId,
    pub payload: GiftPayload,
}

#[derive(Debug, Default)]
struct FakeState {
    donors: BTreeMap<String, DestinationId>,
    created_donors: Vec<(DestinationId, DonorContact)>,
    gifts: Vec<RecordedGift>,
    pledges: Vec<(DestinationId, PledgePayload)>,
    failures: BTreeMap<Operation, VecDeque<DestinationError>>,
    gift_failures: BTreeMap<String, DestinationError>,
    rejected_references: BTreeSet<String>,
    invalid_codes: BTreeSet<(CodeField, String)>,
    connection: Option<ConnectionStatus>,
    calls: CallCounts,
}

/// An in-memory destination CRM.
///
/// Donor lookup is exact on the lower-cased email. Created donors become
/// findable. Every record gets a fresh id from one counter.
#[derive(Debug)]
pub struct FakeDestination {
    state: Mutex<FakeState>,
    next_id: AtomicI64,
    latency: Mutex<Option<Duration>>,
}

impl Default for FakeDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDestination {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            next_id: AtomicI64::new(100),
            latency: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate_id(&self) -> DestinationId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Seed an existing destination donor.
    pub fn add_donor(&self, email: &str, id: DestinationId) {
        self.lock().donors.insert(email.trim().to_ascii_lowercase(), id);
    }

    /// Fail the next call of `operation` with `error`. Queued errors are
    /// returned in order.
    pub fn fail_next(&self, operation: Operation, error: DestinationError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail the next gift with this reference, once.
    pub fn fail_gift_once(&self, reference: impl Into<String>, error: DestinationError) {
        self.lock().gift_failures.insert(reference.into(), error);
    }

    /// Reject every gift whose reference equals `reference`.
    pub fn reject_gifts_with_reference(&self, reference: impl Into<String>) {
        self.lock().rejected_references.insert(reference.into());
    }

    /// Make `validate_code(field, value)` report the code as unknown.
    pub fn reject_code(&self, field: CodeField, value: &str) {
        self.lock().invalid_codes.insert((field, value.to_string()));
    }

    pub fn set_connection(&self, status: ConnectionStatus) {
        self.lock().connection = Some(status);
    }

    /// Delay every call by `latency` (uses `tokio::time`, so paused clocks apply).
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn gifts(&self) -> Vec<RecordedGift> {
        self.lock().gifts.clone()
    }

    pub fn pledges(&self) -> Vec<(DestinationId, PledgePayload)> {
        self.lock().pledges.clone()
    }

    pub fn created_donors(&self) -> Vec<(DestinationId, DonorContact)> {
        self.lock().created_donors.clone()
    }

    async fn enter(&self, operation: Operation) -> DestinationResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let calls = &mut state.calls;
        match operation {
            Operation::FindDonor => calls.find_donor += 1,
            Operation::CreateDonor => calls.create_donor += 1,
            Operation::CreateGift => calls.create_gift += 1,
            Operation::CreatePledge => calls.create_pledge += 1,
            Operation::ValidateCode => calls.validate_code += 1,
            Operation::TestConnection => calls.test_connection += 1,
        }

        match state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn find_donor(&self, email: &str) -> DestinationResult<Option<DestinationId>> {
        self.enter(Operation::FindDonor).await?;
        let key = email.trim().to_ascii_lowercase();
        Ok(self.lock().donors.get(&key).copied())
    }

    async fn create_donor(&self, contact: &DonorContact) -> DestinationResult<DestinationId> {
        self.enter(Operation::CreateDonor).await?;
        let id = self.allocate_id();
        let mut state = self.lock();
        state
            .donors
            .entry(contact.email.trim().to_ascii_lowercase())
            .or_insert(id);
        state.created_donors.push((id, contact.clone()));
        Ok(id)
    }

    async fn create_gift(&self, gift: &GiftPayload) -> DestinationResult<DestinationId> {
        self.enter(Operation::CreateGift).await?;
        if let Some(error) = self.lock().gift_failures.remove(&gift.reference) {
            return Err(error);
        }
        if self.lock().rejected_references.contains(&gift.reference) {
            return Err(DestinationError::api(format!(
                "Gift rejected: {}",
                gift.reference
            )));
        }
        let id = self.allocate_id();
        self.lock().gifts.push(RecordedGift {
            id,
            payload: gift.clone(),
        });
        Ok(id)
    }

    async fn create_pledge(&self, pledge: &PledgePayload) -> DestinationResult<DestinationId> {
        self.enter(Operation::CreatePledge).await?;
        let id = self.allocate_id();
        self.lock().pledges.push((id, pledge.clone()));
        Ok(id)
    }

    async fn validate_code(&self, field: CodeField, value: &str) -> DestinationResult<bool> {
        self.enter(Operation::ValidateCode).await?;
        Ok(!self
            .lock()
            .invalid_codes
            .contains(&(field, value.to_string())))
    }

    async fn test_connection(&self) -> DestinationResult<ConnectionStatus> {
        self.enter(Operation::TestConnection).await?;
        Ok(self
            .lock()
            .connection
            .clone()
            .unwrap_or_else(|| ConnectionStatus::ok("Connected")))
    }
}

// ─── Flaky source ────────────────────────────────────────────────────────────

/// An [`InMemorySource`] whose page fetches can fail or stall.
///
/// Only `fetch_completed` is affected; single lookups and donor listings
/// always go through.
#[derive(Debug, Default)]
pub struct FlakySource {
    inner: InMemorySource,
    failures_left: AtomicUsize,
    fetches: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl FlakySource {
    pub fn new(inner: InMemorySource) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemorySource {
        &self.inner
    }

    /// Fail the next `n` page fetches with `SourceError::Unavailable`.
    pub fn fail_next_fetches(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Delay every page fetch by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Page fetches attempted so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DonationSource for FlakySource {
    async fn fetch_by_id(&self, id: DonationId) -> SourceResult<Option<Donation>> {
        self.inner.fetch_by_id(id).await
    }

    async fn fetch_completed(
        &self,
        after: Option<DonationId>,
        limit: u64,
    ) -> SourceResult<Vec<Donation>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SourceError::unavailable("connection timed out"));
        }

        self.inner.fetch_completed(after, limit).await
    }

    async fn list_donors(&self) -> SourceResult<Vec<SourceDonor>> {
        self.inner.list_donors().await
    }

    async fn count_by_status(&self) -> SourceResult<BTreeMap<DonationStatus, u64>> {
        self.inner.count_by_status().await
    }
}

// ─── Database ────────────────────────────────────────────────────────────────

/// A migrated in-memory SQLite database, shared the way the engine holds it.
#[cfg(all(feature = "sqlite", feature = "migrate"))]
pub async fn memory_db() -> std::sync::Arc<sea_orm::DatabaseConnection> {
    let db = crate::connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    std::sync::Arc::new(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_destination_finds_created_donors() {
        let destination = FakeDestination::new();
        assert_eq!(destination.find_donor("a@example.com").await.unwrap(), None);

        let id = destination
            .create_donor(&DonorContact::new("A", "B", "A@Example.com"))
            .await
            .unwrap();

        assert_eq!(
            destination.find_donor("a@example.com").await.unwrap(),
            Some(id)
        );
        assert_eq!(destination.calls().find_donor, 2);
        assert_eq!(destination.calls().writes(), 1);
    }

    #[tokio::test]
    async fn fake_destination_replays_injected_failures_once() {
        let destination = FakeDestination::new();
        destination.fail_next(Operation::FindDonor, DestinationError::network("reset"));

        assert!(destination.find_donor("a@example.com").await.is_err());
        assert!(destination.find_donor("a@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn one_shot_gift_failure_hits_only_its_reference() {
        use crate::settings::SyncSettings;
        use crate::sync::{gift_reference, translate};

        let destination = FakeDestination::new();
        destination.fail_gift_once(gift_reference(2), DestinationError::network("reset"));
        let settings = SyncSettings::default();
        let gift = |id| translate(&DonationBuilder::single(id).build(), &settings, 9, None);

        assert!(destination.create_gift(&gift(1)).await.is_ok());
        assert!(destination.create_gift(&gift(2)).await.is_err());
        assert!(destination.create_gift(&gift(2)).await.is_ok());
        assert_eq!(destination.gifts().len(), 2);
    }

    #[tokio::test]
    async fn flaky_source_fails_the_requested_number_of_fetches() {
        let source = FlakySource::new(InMemorySource::with_donations([
            DonationBuilder::single(1).build(),
        ]));
        source.fail_next_fetches(2);

        assert!(source.fetch_completed(None, 10).await.is_err());
        assert!(source.fetch_completed(None, 10).await.is_err());
        assert_eq!(source.fetch_completed(None, 10).await.unwrap().len(), 1);
        assert_eq!(source.fetch_count(), 3);
    }

    #[test]
    fn builder_defaults() {
        let donation = DonationBuilder::renewal(7, "S9").cents(1000).build();
        assert_eq!(donation.donation_type, DonationType::Renewal);
        assert_eq!(donation.subscription_id.as_deref(), Some("S9"));
        assert_eq!(donation.amount_cents(), 1000);
        assert_eq!(donation.donor.email, "donor7@example.com");
        assert!(donation.status.is_completed());
    }
}
