//! Donorbridge - a donation sync engine.
//!
//! This library moves donation records from a donation-management platform
//! into a donor CRM reached over a remote API. It keeps an append-only sync
//! log and a durable subscription-to-pledge map so every donation is delivered
//! once and every recurring plan stays attached to a single pledge.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `donorperfect` - The DonorPerfect XML API client and its reqwest transport.
//! - `test-util` - In-memory fakes for the source and destination collaborators.
//!
//! # Example
//!
//! ```ignore
//! use donorbridge::{connect_and_migrate, SyncEngine, SyncSettings};
//!
//! let db = connect_and_migrate("sqlite://donorbridge.db?mode=rwc").await?;
//! let engine = SyncEngine::new(Arc::new(db), source, destination, SyncSettings::default());
//!
//! let result = engine.sync_single(1042).await?;
//! println!("{}: {}", result.donation_id, result.status);
//! ```

pub mod db;
pub mod destination;
pub mod entity;
pub mod http;
pub mod log_store;
pub mod pledge;
pub mod retry;
pub mod settings;
pub mod source;
pub mod sync;

#[cfg(feature = "donorperfect")]
pub mod donorperfect;

#[cfg(feature = "migrate")]
pub mod migration;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use destination::{DestinationClient, DestinationError, RateLimitedClient};
pub use entity::prelude::*;
pub use log_store::{LogStore, LogStoreError};
pub use pledge::{PledgeLinker, PledgeMapStore};
pub use settings::SyncSettings;
pub use source::{DonationSource, SourceError};
pub use sync::{SyncEngine, SyncError};
