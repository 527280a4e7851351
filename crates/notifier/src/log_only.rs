//! Log-only notifier

use crate::{Notifier, NotifyError};
use async_trait::async_trait;
use tracing::info;

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        info!("[Message] {}", message);
        Ok(())
    }
}
