//! Destination CRM client contract.
//!
//! This module defines the `DestinationClient` trait the sync engine talks
//! to. The engine needs donor search and creation, gift creation, pledge
//! creation, and the two configuration checks. It never depends on how a
//! particular CRM encodes those calls; see [`crate::donorperfect`] for the
//! DonorPerfect XML API implementation.
//!
//! # Example
//!
//! ```ignore
//! use donorbridge::destination::{DestinationClient, RateLimitedClient, rate_limits};
//!
//! let client = RateLimitedClient::new(client, rate_limits::DEFAULT_RPS);
//! if let Some(donor_id) = client.find_donor("ada@example.com").await? {
//!     println!("matched donor {donor_id}");
//! }
//! ```

mod errors;
mod rate_limit;
mod types;

pub use errors::{DestinationError, Result, short_error_message};
pub use rate_limit::{RateLimitedClient, rate_limits};
pub use types::{
    CodeField, ConnectionStatus, DestinationClient, DestinationId, GiftPayload, PledgePayload,
};
