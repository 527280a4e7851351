//! Beacon Chain Explorer Client
//!
//! This crate provides async access to a beaconcha.in-compatible explorer
//! REST API: resolving the monitored validator set, and fetching validator
//! status and attestation effectiveness in rate-limited batches.

mod client;
mod error;
mod retry;
mod source;
mod types;

pub use client::{BeaconClient, ClientConfig, DEFAULT_BASE_URL};
pub use error::FetchError;
pub use retry::RetryPolicy;
pub use source::{EffectivenessSource, StatusSource};
pub use types::{
    validator_url, EffectivenessRecord, StatusRecord, ValidatorIndex, ValidatorSelection,
    ValidatorStatus,
};

/// Explorer API path constants
pub mod api {
    /// Prefix of the public JSON API
    pub const V1: &str = "/api/v1";
    /// Prefix of the dashboard data API (validator status)
    pub const DASHBOARD: &str = "/dashboard/data";
    /// Maximum number of validators per request
    pub const BATCH_SIZE: usize = 50;
}
