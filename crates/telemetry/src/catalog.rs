//! Metric names and recording helpers
//!
//! Metric names and labels are a stable contract for dashboards. Every
//! call goes through the `metrics` facade, so recording is a no-op until
//! an exporter is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Prefix shared by every exported metric
pub const PREFIX: &str = "eth2monitor_";

const CONFIG_INFO: &str = "eth2monitor_config_info";
const VALIDATORS_TOTAL: &str = "eth2monitor_validators_total";
const MAIN_LOOP_ERRORS: &str = "eth2monitor_main_loop_errors";
const MAIN_LOOP_CONSECUTIVE_ERRORS: &str = "eth2monitor_main_loop_consecutive_errors";
const CHECK_SECONDS: &str = "eth2monitor_check_seconds";
const HTTP_REQUEST: &str = "eth2monitor_beaconchain_http_request";
const HTTP_REQUEST_SUCCESS: &str = "eth2monitor_beaconchain_http_request_success";
const VALIDATOR_UP: &str = "eth2monitor_validator_up";
const VALIDATOR_EFFECTIVENESS: &str = "eth2monitor_validator_effectiveness_ratio";

/// Register descriptions for every metric. Call once after installing the exporter.
pub fn describe_metrics() {
    describe_gauge!(CONFIG_INFO, "Config parameters");
    describe_gauge!(VALIDATORS_TOTAL, "Number of validators being monitored");
    describe_counter!(MAIN_LOOP_ERRORS, "Number of errors in the main loop");
    describe_gauge!(
        MAIN_LOOP_CONSECUTIVE_ERRORS,
        "Number of consecutive errors accumulated by the last main loop executions"
    );
    describe_histogram!(
        CHECK_SECONDS,
        "Time it takes to check and report the state of all the validators in every loop"
    );
    describe_counter!(HTTP_REQUEST, "Number of GET requests to the beacon chain REST API");
    describe_counter!(
        HTTP_REQUEST_SUCCESS,
        "Number of successful GET requests to the beacon chain REST API"
    );
    describe_gauge!(VALIDATOR_UP, "Whether the validator is online (1) or not (0)");
    describe_gauge!(
        VALIDATOR_EFFECTIVENESS,
        "Validator effectiveness expressed as a ratio between 0 and 1"
    );
}

pub fn record_config_info(beacon_chain_base_url: &str, telegram_enabled: bool) {
    let enabled = if telegram_enabled { "Yes" } else { "No" };
    gauge!(
        CONFIG_INFO,
        "beacon_chain_base_url" => beacon_chain_base_url.to_string(),
        "telegram_notifications_enabled" => enabled
    )
    .set(1.0);
}

pub fn record_validators_total(total: usize) {
    gauge!(VALIDATORS_TOTAL).set(total as f64);
}

pub fn record_loop_error() {
    counter!(MAIN_LOOP_ERRORS).increment(1);
}

pub fn record_consecutive_errors(count: u64) {
    gauge!(MAIN_LOOP_CONSECUTIVE_ERRORS).set(count as f64);
}

pub fn record_check_duration(elapsed: Duration) {
    histogram!(CHECK_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_http_request() {
    counter!(HTTP_REQUEST).increment(1);
}

pub fn record_http_success() {
    counter!(HTTP_REQUEST_SUCCESS).increment(1);
}

pub fn record_validator_up(index: u64, up: bool) {
    gauge!(VALIDATOR_UP, "index" => index.to_string()).set(if up { 1.0 } else { 0.0 });
}

pub fn record_validator_effectiveness(index: u64, ratio: f64) {
    gauge!(VALIDATOR_EFFECTIVENESS, "index" => index.to_string()).set(ratio);
}
