//! Liveness watchdog
//!
//! Tracks the last successful cycle. Once no cycle has succeeded for the
//! kill switch duration the process is expected to restart itself, which
//! also discards all in-memory monitor state.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Watchdog {
    /// Maximum time without a successful cycle
    kill_switch: Duration,
    /// Last successful cycle (or creation)
    last_success: Instant,
}

impl Watchdog {
    /// Create a watchdog; creation counts as a success
    pub fn new(kill_switch: Duration) -> Self {
        Self {
            kill_switch,
            last_success: Instant::now(),
        }
    }

    /// Maximum time without a successful cycle
    pub fn kill_switch(&self) -> Duration {
        self.kill_switch
    }

    /// Record a successful cycle
    pub fn record_success(&mut self) {
        self.last_success = Instant::now();
    }

    /// Time since the last successful cycle
    pub fn since_last_success(&self) -> Duration {
        self.last_success.elapsed()
    }

    /// Whether the kill switch has been reached
    pub fn is_expired(&self) -> bool {
        self.since_last_success() >= self.kill_switch
    }
}
