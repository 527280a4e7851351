//! Notification composition and delivery

use beacon_client::{validator_url, ValidatorIndex};
use notifier::{markdown, Notifier};
use tracing::{error, info};

/// A grouped change, rendered once for operators and once for the log
pub(crate) struct ChangeMessage {
    /// MarkdownV2 header, already escaped
    pub header: String,
    /// Plain header for the log
    pub plain_header: String,
}

impl ChangeMessage {
    /// Full MarkdownV2 message with a deep link per validator
    pub fn render(&self, validators: &[ValidatorIndex], explorer_url: &str) -> String {
        let links = validators
            .iter()
            .map(|index| markdown::link(&index.to_string(), &validator_url(explorer_url, *index)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}{}", self.header, links)
    }

    pub fn render_plain(&self, validators: &[ValidatorIndex]) -> String {
        let list = validators
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}{}", self.plain_header, list)
    }
}

/// Log the change and, when notifying, deliver it. Delivery failures are
/// logged and swallowed.
pub(crate) async fn report_change(
    message: &ChangeMessage,
    validators: &[ValidatorIndex],
    explorer_url: &str,
    notify: bool,
    notifier: &dyn Notifier,
) {
    let plain = message.render_plain(validators);
    if !notify {
        info!("{} (not notified yet)", plain);
        return;
    }

    info!("{}", plain);
    if let Err(e) = notifier.send(&message.render(validators, explorer_url)).await {
        error!("Error notifying change: {}", e);
    }
}
