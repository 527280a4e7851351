//! Daemon settings
//!
//! Loaded from a YAML file (`config.yml`, or the path in `CONFIG_FILE`)
//! layered with `VALIDATOR_MONITOR__SECTION__KEY` environment overrides.

use alerting::EscalationPolicy;
use beacon_client::{ClientConfig, RetryPolicy, ValidatorSelection, DEFAULT_BASE_URL};
use monitor::MonitorConfig;
use notifier::TelegramConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Environment variable holding the configuration file path
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Configuration file used when `CONFIG_FILE` is not set
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Prefix of environment overrides
const ENV_PREFIX: &str = "VALIDATOR_MONITOR";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Explorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconChainConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BeaconChainConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Polling, debounce and failure handling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckHealthConfig {
    /// Seconds between cycles
    #[serde(default = "default_polling_wait")]
    pub polling_wait: f64,
    /// Seconds to pause after each explorer batch request
    #[serde(default = "default_batch_request_delay")]
    pub batch_request_delay: f64,
    /// Debounce window
    #[serde(default = "default_notify_delay_seconds")]
    pub notify_delay_seconds: u64,
    /// Restart after this long without a successful cycle
    #[serde(default = "default_kill_switch_minutes")]
    pub watch_dog_kill_switch_minutes: f64,
    /// Consecutive failure counts that alert
    #[serde(default = "default_error_thresholds")]
    pub notify_error_count_thresholds: Vec<u64>,
    /// Effectiveness ratio at or below which a validator is critical
    #[serde(default)]
    pub notify_effectiveness_threshold: Option<f64>,
    /// Time an in-flight cycle gets to finish on shutdown
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Default for CheckHealthConfig {
    fn default() -> Self {
        Self {
            polling_wait: default_polling_wait(),
            batch_request_delay: default_batch_request_delay(),
            notify_delay_seconds: default_notify_delay_seconds(),
            watch_dog_kill_switch_minutes: default_kill_switch_minutes(),
            notify_error_count_thresholds: default_error_thresholds(),
            notify_effectiveness_threshold: None,
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

/// Telegram section as written by operators; both fields are needed to enable it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelegramSection {
    pub access_token: Option<String>,
    pub chat_id: Option<String>,
    pub max_attempts: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Prometheus exporter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    pub port: u16,
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub beacon_chain: BeaconChainConfig,
    #[serde(default)]
    pub check_health: CheckHealthConfig,
    #[serde(default)]
    pub telegram: Option<TelegramSection>,
    #[serde(default)]
    pub prometheus: Option<PrometheusConfig>,
    #[serde(default)]
    pub validators: ValidatorSelection,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_polling_wait() -> f64 {
    60.0
}

fn default_batch_request_delay() -> f64 {
    0.2
}

fn default_notify_delay_seconds() -> u64 {
    300
}

fn default_kill_switch_minutes() -> f64 {
    30.0
}

fn default_error_thresholds() -> Vec<u64> {
    alerting::DEFAULT_THRESHOLDS.to_vec()
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

impl AppConfig {
    /// Load from the file named by `CONFIG_FILE` (default `config.yml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(config::File::new(&path, config::FileFormat::Yaml))
    }

    /// Load from any file source layered with the environment, then validate
    pub fn load_from<F>(file: F) -> Result<Self, ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("check_health.notify_error_count_thresholds")
                    .with_list_parse_key("validators.public_keys")
                    .with_list_parse_key("validators.indexes"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = &self.check_health;

        if duration("polling_wait", check.polling_wait)?.is_zero() {
            return Err(ConfigError::Invalid(
                "check_health.polling_wait must be positive".to_string(),
            ));
        }
        if duration(
            "watch_dog_kill_switch_minutes",
            check.watch_dog_kill_switch_minutes * 60.0,
        )?
        .is_zero()
        {
            return Err(ConfigError::Invalid(
                "check_health.watch_dog_kill_switch_minutes must be positive".to_string(),
            ));
        }
        duration("batch_request_delay", check.batch_request_delay)?;
        if check.notify_error_count_thresholds.is_empty()
            || check.notify_error_count_thresholds.contains(&0)
        {
            return Err(ConfigError::Invalid(
                "check_health.notify_error_count_thresholds must be a non-empty list of positive counts"
                    .to_string(),
            ));
        }
        if let Some(threshold) = check.notify_effectiveness_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "check_health.notify_effectiveness_threshold must be within [0, 1], got {}",
                    threshold
                )));
            }
        }
        if self.validators.is_empty() {
            return Err(ConfigError::Invalid(
                "validators: configure an eth1_withdraw_account, public_keys or indexes".to_string(),
            ));
        }

        Ok(())
    }

    /// Telegram settings, or `None` (with a warning) when notifications are disabled
    pub fn telegram_config(&self) -> Option<TelegramConfig> {
        let Some(section) = &self.telegram else {
            warn!("Telegram Notifications are disabled. Config the \"telegram\" channel to enable them");
            return None;
        };

        let token = section.access_token.as_deref().map(str::trim).unwrap_or_default();
        let chat_id = section.chat_id.as_deref().map(str::trim).unwrap_or_default();
        if token.is_empty() || chat_id.is_empty() {
            warn!(
                "Telegram Notifications are disabled. Config the \"telegram\" requires both \"access_token\" and \"chat_id\""
            );
            return None;
        }

        let mut config = TelegramConfig::new(token, chat_id);
        if let Some(max_attempts) = section.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(timeout_seconds) = section.timeout_seconds {
            config.timeout_seconds = timeout_seconds;
        }
        Some(config)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.beacon_chain.base_url.clone(),
            batch_delay: seconds(self.check_health.batch_request_delay),
            retry: RetryPolicy::default(),
            ..ClientConfig::default()
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            notify_delay: Duration::from_secs(self.check_health.notify_delay_seconds),
            explorer_url: self.beacon_chain.base_url.trim_end_matches('/').to_string(),
            effectiveness_threshold: self.check_health.notify_effectiveness_threshold,
        }
    }

    pub fn polling_wait(&self) -> Duration {
        seconds(self.check_health.polling_wait)
    }

    pub fn kill_switch(&self) -> Duration {
        seconds(self.check_health.watch_dog_kill_switch_minutes * 60.0)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.check_health.shutdown_grace_seconds)
    }

    pub fn escalation(&self) -> EscalationPolicy {
        EscalationPolicy::new(self.check_health.notify_error_count_thresholds.iter().copied())
    }
}

/// Seconds as a duration, rejecting negative, non-finite and overflowing values
fn duration(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::Invalid(format!("check_health.{}: {} ({})", field, e, secs)))
}

/// Seconds of a validated setting
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
