use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::source::DonorContact;

use super::errors::Result;
use super::types::{
    CodeField, ConnectionStatus, DestinationClient, DestinationId, GiftPayload, PledgePayload,
};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request rates for destination APIs.
pub mod rate_limits {
    /// DonorPerfect throttles aggressive clients; two calls a second keeps a
    /// five-donation batch well inside one request timeout.
    pub const DEFAULT_RPS: u32 = 2;
}

/// A rate-limited wrapper around any `DestinationClient`.
///
/// Every call waits for the governor before delegating to the inner client,
/// so the engine stays gentle with the destination even when a backfill is
/// running back to back.
///
/// # Example
///
/// ```ignore
/// use donorbridge::destination::{RateLimitedClient, rate_limits};
///
/// let client = RateLimitedClient::new(dp_client, rate_limits::DEFAULT_RPS);
/// ```
pub struct RateLimitedClient<C> {
    inner: C,
    rate_limiter: Arc<GovernorRateLimiter>,
}

impl<C> RateLimitedClient<C> {
    /// Wrap `inner`, allowing `requests_per_second` calls (0 is treated as 1).
    pub fn new(inner: C, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner,
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn wait(&self) {
        self.rate_limiter.until_ready().await;
    }
}

impl<C: Clone> Clone for RateLimitedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            rate_limiter: Arc::clone(&self.rate_limiter),
        }
    }
}

#[async_trait]
impl<C: DestinationClient> DestinationClient for RateLimitedClient<C> {
    async fn find_donor(&self, email: &str) -> Result<Option<DestinationId>> {
        self.wait().await;
        self.inner.find_donor(email).await
    }

    async fn create_donor(&self, contact: &DonorContact) -> Result<DestinationId> {
        self.wait().await;
        self.inner.create_donor(contact).await
    }

    async fn create_gift(&self, gift: &GiftPayload) -> Result<DestinationId> {
        self.wait().await;
        self.inner.create_gift(gift).await
    }

    async fn create_pledge(&self, pledge: &PledgePayload) -> Result<DestinationId> {
        self.wait().await;
        self.inner.create_pledge(pledge).await
    }

    async fn validate_code(&self, field: CodeField, value: &str) -> Result<bool> {
        self.wait().await;
        self.inner.validate_code(field, value).await
    }

    async fn test_connection(&self) -> Result<ConnectionStatus> {
        self.wait().await;
        self.inner.test_connection().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::testing::FakeDestination;

    #[tokio::test]
    async fn delegates_to_inner_client() {
        let inner = FakeDestination::new();
        inner.add_donor("ada@example.com", 41);
        let client = RateLimitedClient::new(inner, 100);

        assert_eq!(client.find_donor("ada@example.com").await.unwrap(), Some(41));
        assert_eq!(client.inner().calls().find_donor, 1);
    }

    #[tokio::test]
    async fn zero_rps_is_treated_as_one_per_second() {
        let client = RateLimitedClient::new(FakeDestination::new(), 0);

        let start = Instant::now();
        client.find_donor("a@example.com").await.unwrap();
        client.find_donor("b@example.com").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn clones_share_the_same_limiter() {
        let client = RateLimitedClient::new(std::sync::Arc::new(FakeDestination::new()), 5);
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.rate_limiter, &clone.rate_limiter));
    }
}
