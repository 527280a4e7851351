//! Validator status monitor

use crate::config::MonitorConfig;
use crate::message::{report_change, ChangeMessage};
use crate::MonitorError;
use alerting::DebounceEngine;
use beacon_client::{StatusRecord, StatusSource, ValidatorIndex, ValidatorStatus};
use notifier::{markdown, Notifier};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Outcome of one status check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    /// Whether the changes below were notified (and committed)
    pub notified: bool,
    /// Validators whose status differs from the committed one, by new status
    pub changes: BTreeMap<ValidatorStatus, Vec<ValidatorIndex>>,
}

/// Tracks validator status changes
pub struct StatusMonitor {
    validators: Vec<ValidatorIndex>,
    explorer_url: String,
    debounce: DebounceEngine<ValidatorIndex>,
    /// Last notified status per validator; absent means online
    committed: BTreeMap<ValidatorIndex, ValidatorStatus>,
}

impl StatusMonitor {
    pub fn new(validators: Vec<ValidatorIndex>, config: &MonitorConfig) -> Self {
        Self {
            validators,
            explorer_url: config.explorer_url.clone(),
            debounce: DebounceEngine::new("status", config.notify_delay),
            committed: BTreeMap::new(),
        }
    }

    /// Last notified status of a validator
    pub fn committed_status(&self, index: ValidatorIndex) -> ValidatorStatus {
        self.committed.get(&index).cloned().unwrap_or_default()
    }

    /// Whether a validator is waiting for its change to be notified
    pub fn is_waiting(&self, index: ValidatorIndex) -> bool {
        self.debounce.is_waiting(&index)
    }

    /// Poll the source, debounce changes and notify them once durable
    pub async fn check(
        &mut self,
        source: &dyn StatusSource,
        notifier: &dyn Notifier,
    ) -> Result<StatusReport, MonitorError> {
        debug!("Check state of {} validators", self.validators.len());
        let records = source.fetch_status(&self.validators).await?;

        let changes = self.detect_changes(&records);
        let observed: BTreeSet<ValidatorIndex> = records.iter().map(|record| record.index).collect();
        let abnormal: BTreeSet<ValidatorIndex> = changes.values().flatten().copied().collect();
        let decision = self.debounce.evaluate_observed(&abnormal, &observed);

        if decision.notify {
            for (status, indexes) in &changes {
                for index in indexes {
                    self.committed.insert(*index, status.clone());
                }
            }
        }

        for (status, indexes) in &changes {
            report_change(
                &change_message(status, indexes.len()),
                indexes,
                &self.explorer_url,
                decision.notify,
                notifier,
            )
            .await;
        }

        Ok(StatusReport {
            notified: decision.notify,
            changes,
        })
    }

    /// Publish the up gauge and group validators whose status differs from committed
    fn detect_changes(
        &self,
        records: &[StatusRecord],
    ) -> BTreeMap<ValidatorStatus, Vec<ValidatorIndex>> {
        let mut changes: BTreeMap<ValidatorStatus, Vec<ValidatorIndex>> = BTreeMap::new();

        for record in records {
            telemetry::record_validator_up(record.index.get(), record.status.is_online());

            if record.status == self.committed_status(record.index) {
                continue;
            }
            changes
                .entry(record.status.clone())
                .or_default()
                .push(record.index);
        }

        changes
    }
}

/// Operator facing label for a status, in MarkdownV2 and plain form
fn status_label(status: &ValidatorStatus) -> (String, String) {
    match status {
        ValidatorStatus::ActiveOnline => ("*ONLINE* 👍".to_string(), "ONLINE".to_string()),
        ValidatorStatus::ActiveOffline => ("*OFFLINE* 🔥".to_string(), "OFFLINE".to_string()),
        ValidatorStatus::Other(label) => (
            format!("*UNKNOWN* \\({}\\) ❓", markdown::escape(label)),
            format!("UNKNOWN ({})", label),
        ),
    }
}

fn change_message(status: &ValidatorStatus, count: usize) -> ChangeMessage {
    let (label, plain_label) = status_label(status);
    ChangeMessage {
        header: format!("{} Validators changed to {}: ", count, label),
        plain_header: format!("{} Validators changed to {}: ", count, plain_label),
    }
}
