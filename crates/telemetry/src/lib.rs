//! Telemetry
//!
//! Logging initialisation, the metric catalog shared by every crate, and
//! the Prometheus HTTP exporter.

mod catalog;
mod exporter;
mod logging;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use catalog::{
    describe_metrics, record_check_duration, record_config_info, record_consecutive_errors,
    record_http_request, record_http_success, record_loop_error, record_validator_effectiveness,
    record_validator_up, record_validators_total, PREFIX,
};
pub use exporter::{install_prometheus, ExporterError};
pub use logging::{init_logging, log_level_from_env};
