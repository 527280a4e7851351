//! Monitor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the status and effectiveness monitors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How long a change must persist before it is notified
    pub notify_delay: Duration,

    /// Explorer base URL used for validator deep links
    pub explorer_url: String,

    /// Effectiveness at or below this ratio is critical. `None` disables
    /// effectiveness notifications (the metric is still published).
    pub effectiveness_threshold: Option<f64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            notify_delay: Duration::from_secs(300),
            explorer_url: beacon_client::DEFAULT_BASE_URL.to_string(),
            effectiveness_threshold: None,
        }
    }
}
