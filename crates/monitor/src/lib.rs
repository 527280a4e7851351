//! Validator Monitors
//!
//! Turns raw observations into debounced operator notifications:
//! - status monitoring (online, offline, anything else)
//! - effectiveness monitoring against an optional threshold
//!
//! Each monitor owns the state it last notified ("committed") and a
//! debounce engine; the committed state only moves when a notification
//! for the validator goes out.

pub mod config;
pub mod effectiveness;
mod message;
pub mod status;

#[cfg(test)]
mod testing;

pub use config::MonitorConfig;
pub use effectiveness::{EffectivenessMonitor, EffectivenessReport};
pub use status::{StatusMonitor, StatusReport};

use beacon_client::FetchError;
use thiserror::Error;

/// Monitor error types. Any of them fails the whole cycle.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Fetching validator data failed: {0}")]
    Fetch(#[from] FetchError),
}
