//! Telegram bot notifier

use crate::{Notifier, NotifyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Telegram Bot API endpoint
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot access token
    pub access_token: String,
    /// Chat to post into
    pub chat_id: String,
    /// Attempts per message, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout for a single attempt (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_timeout_seconds() -> u64 {
    10
}

impl TelegramConfig {
    pub fn new(access_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            chat_id: chat_id.into(),
            max_attempts: default_max_attempts(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    /// Token safe to print
    pub fn redacted_token(&self) -> String {
        let token = &self.access_token;
        let chars = token.chars().count();
        if chars <= 8 {
            return "****".to_string();
        }
        let head: String = token.chars().take(4).collect();
        let tail: String = token.chars().skip(chars - 4).collect();
        format!("{}...{}", head, tail)
    }
}

/// Bot identity returned by `getMe`
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, http_status: u16) -> Result<Option<T>, NotifyError> {
        if self.ok {
            return Ok(self.result);
        }
        let code = self.error_code.unwrap_or(http_status);
        let description = self.description.unwrap_or_else(|| "unknown error".to_string());
        if code == 400 {
            Err(NotifyError::Rejected(description))
        } else {
            Err(NotifyError::Api { code, description })
        }
    }
}

/// Posts messages to a Telegram chat
pub struct TelegramNotifier {
    http: reqwest::Client,
    config: TelegramConfig,
    api_base: String,
    initial_backoff: Duration,
}

impl TelegramNotifier {
    /// Create a new notifier
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        if config.access_token.trim().is_empty() || config.chat_id.trim().is_empty() {
            return Err(NotifyError::Config(
                "telegram requires both \"access_token\" and \"chat_id\"".to_string(),
            ));
        }

        debug!(
            "Connect to Telegram. chat_id: {}, access_token={}",
            config.chat_id,
            config.redacted_token()
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        Ok(Self {
            http,
            config,
            api_base: DEFAULT_API_BASE.to_string(),
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Point the notifier at another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the delay before the first retry
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Map a request failure, keeping the token (part of the URL) out of the error
    fn transport_error(&self, e: reqwest::Error) -> NotifyError {
        if e.is_timeout() {
            NotifyError::Timeout(Duration::from_secs(self.config.timeout_seconds.max(1)))
        } else {
            NotifyError::Http(e.without_url())
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.config.access_token, method)
    }

    /// Verify the token by asking who the bot is
    pub async fn get_me(&self) -> Result<BotIdentity, NotifyError> {
        let response = self
            .http
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body: ApiResponse<BotIdentity> = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        body.into_result(status)?
            .ok_or_else(|| NotifyError::Api {
                code: status,
                description: "getMe returned no result".to_string(),
            })
    }

    async fn send_once(&self, text: &str) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.config.chat_id,
            text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        body.into_result(status).map(|_| ())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(message).await {
                Ok(()) => {
                    debug!("Telegram message delivered (attempt {})", attempt);
                    return Ok(());
                }
                Err(NotifyError::Rejected(reason)) => {
                    error!("Error sending telegram message: {}. BadRequest: {}", message, reason);
                    return Err(NotifyError::Rejected(reason));
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "Telegram delivery failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt, max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) if e.is_transient() => {
                    return Err(NotifyError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.config.chat_id)
            .field("access_token", &self.config.redacted_token())
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Log the bot identity, or warn when the token does not work
pub async fn announce_identity(notifier: &TelegramNotifier) {
    match notifier.get_me().await {
        Ok(bot) => info!(
            "[{}] Telegram bot \"{}\" is up",
            bot.username.as_deref().unwrap_or("-"),
            bot.first_name
        ),
        Err(e) => warn!("Unable to verify the Telegram bot: {}", e),
    }
}
