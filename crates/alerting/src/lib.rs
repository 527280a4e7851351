//! Alerting
//!
//! Decides when something is worth telling an operator about:
//! - debouncing of state changes until they have persisted long enough
//! - escalation of consecutive failures at configured milestones
//! - a watchdog that gives up after too long without a successful cycle

mod debounce;
mod escalation;
mod watchdog;

pub use debounce::{DebounceEngine, Decision};
pub use escalation::{EscalationPolicy, DEFAULT_THRESHOLDS};
pub use watchdog::Watchdog;
