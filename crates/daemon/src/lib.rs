//! Validator Monitor Daemon
//!
//! Wires the explorer client, the monitors and the notifier together:
//! configuration loading, the polling loop with its watchdog, and signal
//! driven shutdown.

pub mod runner;
pub mod settings;
pub mod shutdown;

pub use runner::{
    watching_message, ExitReason, Runner, RunnerConfig, FAREWELL_MESSAGE, RESTARTED_MESSAGE,
};
pub use settings::{AppConfig, ConfigError};
pub use shutdown::{listen_for_signals, ShutdownSignal, ShutdownTrigger};
