//! Tracing subscriber setup

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Environment variable holding the log level (`trace`, `debug`, `info`, ...)
const LOG_LEVEL_ENV: &str = "LOGLEVEL";

/// Read the log level from `LOGLEVEL`, falling back to INFO
pub fn log_level_from_env() -> Level {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(Level::INFO)
}

/// Initialize logging
pub fn init_logging(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
