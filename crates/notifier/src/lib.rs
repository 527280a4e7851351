//! Operator Notifications
//!
//! Delivery of human-readable messages:
//! - Telegram bot messages (MarkdownV2) with bounded retries
//! - a log-only notifier when no bot is configured
//! - MarkdownV2 escaping helpers for message composition

mod log_only;
pub mod markdown;
mod telegram;

pub use log_only::LogNotifier;
pub use telegram::{announce_identity, BotIdentity, TelegramConfig, TelegramNotifier};

use async_trait::async_trait;
use thiserror::Error;

/// Notification error types
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotifyError {
    /// Whether sending the same message again may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Http(_) | NotifyError::Timeout(_) => true,
            NotifyError::Api { code, .. } => *code == 429 || *code >= 500,
            NotifyError::Rejected(_)
            | NotifyError::RetriesExhausted { .. }
            | NotifyError::Config(_) => false,
        }
    }
}

/// Delivers a text message to operators. Delivery is at-least-once.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}
