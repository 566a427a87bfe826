//! Donation source: the platform donations are read from.
//!
//! The sync engine only reads from the source. It asks for single donations
//! by id, pages through completed donations in ascending id order, and lists
//! donors for the match report. Which donations are still unsynced is decided
//! by the engine from the sync log, not by the source.
//!
//! # Example
//!
//! ```ignore
//! use donorbridge::source::{DonationSource, InMemorySource};
//!
//! let source = InMemorySource::from_json_file("export.json")?;
//! let first_page = source.fetch_completed(None, 100).await?;
//! ```

mod errors;
mod memory;
mod types;

pub use errors::{Result, SourceError};
pub use memory::{InMemorySource, SourceExport};
pub use types::{
    DonationSource, Donation, DonationId, DonationStatus, DonorContact, SourceDonor, is_valid_email,
};
