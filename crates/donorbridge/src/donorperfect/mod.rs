//! DonorPerfect XML API client.
//!
//! DonorPerfect exposes a single endpoint taking an API key and an `action`
//! in the query string. Reads are `SELECT` statements; writes call stored
//! procedures (`dp_savedonor`, `dp_savegift`, `dp_savepledge`) with
//! `@name=value` parameters. Every response is an XML `<result>` document.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use donorbridge::donorperfect::DonorPerfectClient;
//! use donorbridge::http::reqwest_transport::ReqwestTransport;
//!
//! let transport = ReqwestTransport::with_timeout(Duration::from_secs(30))?;
//! let client = DonorPerfectClient::new(transport, api_key);
//! let status = client.test_connection().await?;
//! ```

mod client;
mod xml;

pub use client::{DEFAULT_BASE_URL, DonorPerfectClient};
pub use xml::{Record, format_amount, quote};
