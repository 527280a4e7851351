//! Failure escalation policy
//!
//! A long outage produces one failed cycle per polling interval. Operators
//! are told at a few milestones and then periodically, instead of on every
//! failure.

use tracing::warn;

/// Default milestones: 15 failures, 60 failures, 1440 failures
pub const DEFAULT_THRESHOLDS: [u64; 3] = [15, 60, 1440];

/// Decides at which consecutive failure counts an alert is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Sorted, deduplicated, non-zero milestones
    thresholds: Vec<u64>,
}

impl EscalationPolicy {
    /// Create a policy from the configured milestones. Zeros are ignored.
    pub fn new(thresholds: impl IntoIterator<Item = u64>) -> Self {
        let mut thresholds: Vec<u64> = thresholds.into_iter().filter(|t| *t > 0).collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        if thresholds.is_empty() {
            warn!("No failure notification thresholds configured. Failures will never be notified");
        }
        Self { thresholds }
    }

    /// Largest milestone; alerts repeat at every multiple of it
    pub fn period(&self) -> Option<u64> {
        self.thresholds.last().copied()
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    /// Whether reaching `failures` consecutive failures should alert
    pub fn should_alert(&self, failures: u64) -> bool {
        if failures == 0 {
            return false;
        }
        if self.thresholds.binary_search(&failures).is_ok() {
            return true;
        }
        self.period().map_or(false, |period| failures % period == 0)
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLDS)
    }
}
