//! Validator effectiveness monitor
//!
//! A validator is OK while its attestation effectiveness is strictly above
//! the configured threshold. Transitions in either direction go through the
//! debounce engine; the worst score reported in a critical message is taken
//! from the validators turning critical in that cycle only.

use crate::config::MonitorConfig;
use crate::message::{report_change, ChangeMessage};
use crate::MonitorError;
use alerting::DebounceEngine;
use beacon_client::{EffectivenessRecord, EffectivenessSource, ValidatorIndex};
use notifier::{markdown, Notifier};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Outcome of one effectiveness check
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectivenessReport {
    /// Whether the transitions below were notified (and committed)
    pub notified: bool,
    /// Validators that went back above the threshold
    pub to_ok: Vec<ValidatorIndex>,
    /// Validators that fell to or below the threshold
    pub to_ko: Vec<ValidatorIndex>,
    /// Lowest effectiveness among `to_ko`
    pub worst: Option<f64>,
}

#[derive(Default)]
struct Transitions {
    to_ok: Vec<ValidatorIndex>,
    to_ko: Vec<ValidatorIndex>,
    worst: Option<f64>,
}

/// Tracks validator effectiveness against a threshold
pub struct EffectivenessMonitor {
    validators: Vec<ValidatorIndex>,
    explorer_url: String,
    threshold: Option<f64>,
    debounce: DebounceEngine<ValidatorIndex>,
    /// Last notified classification; absent means OK
    committed: BTreeMap<ValidatorIndex, bool>,
}

impl EffectivenessMonitor {
    pub fn new(validators: Vec<ValidatorIndex>, config: &MonitorConfig) -> Self {
        Self {
            validators,
            explorer_url: config.explorer_url.clone(),
            threshold: config.effectiveness_threshold,
            debounce: DebounceEngine::new("effectiveness", config.notify_delay),
            committed: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold.is_some()
    }

    /// Last notified classification of a validator
    pub fn committed_ok(&self, index: ValidatorIndex) -> bool {
        self.committed.get(&index).copied().unwrap_or(true)
    }

    pub fn is_waiting(&self, index: ValidatorIndex) -> bool {
        self.debounce.is_waiting(&index)
    }

    /// Poll the source, publish the ratios and notify durable transitions
    pub async fn check(
        &mut self,
        source: &dyn EffectivenessSource,
        notifier: &dyn Notifier,
    ) -> Result<EffectivenessReport, MonitorError> {
        debug!("Check effectiveness of {} validators", self.validators.len());
        let records = source.fetch_effectiveness(&self.validators).await?;

        for record in &records {
            telemetry::record_validator_effectiveness(record.index.get(), record.effectiveness);
        }

        let Some(threshold) = self.threshold else {
            return Ok(EffectivenessReport::default());
        };

        let transitions = self.detect_transitions(&records, threshold);
        let observed: BTreeSet<ValidatorIndex> = records.iter().map(|record| record.index).collect();
        let abnormal: BTreeSet<ValidatorIndex> = transitions
            .to_ok
            .iter()
            .chain(&transitions.to_ko)
            .copied()
            .collect();
        let decision = self.debounce.evaluate_observed(&abnormal, &observed);

        if decision.notify {
            for index in &transitions.to_ok {
                self.committed.insert(*index, true);
            }
            for index in &transitions.to_ko {
                self.committed.insert(*index, false);
            }
        }

        if !transitions.to_ok.is_empty() {
            let message = ChangeMessage {
                header: format!(
                    "{} Validators effectiveness changed to *OK* 📈: ",
                    transitions.to_ok.len()
                ),
                plain_header: format!(
                    "{} Validators effectiveness changed to OK: ",
                    transitions.to_ok.len()
                ),
            };
            report_change(
                &message,
                &transitions.to_ok,
                &self.explorer_url,
                decision.notify,
                notifier,
            )
            .await;
        }

        if !transitions.to_ko.is_empty() {
            let percent = transitions.worst.unwrap_or(0.0) * 100.0;
            let message = ChangeMessage {
                header: format!(
                    "{} Validators effectiveness changed to *Critical* 🚨 {}: ",
                    transitions.to_ko.len(),
                    markdown::escape(&format!("(~{:.1}%)", percent))
                ),
                plain_header: format!(
                    "{} Validators effectiveness changed to Critical (~{:.1}%): ",
                    transitions.to_ko.len(),
                    percent
                ),
            };
            report_change(
                &message,
                &transitions.to_ko,
                &self.explorer_url,
                decision.notify,
                notifier,
            )
            .await;
        }

        Ok(EffectivenessReport {
            notified: decision.notify,
            to_ok: transitions.to_ok,
            to_ko: transitions.to_ko,
            worst: transitions.worst,
        })
    }

    fn detect_transitions(&self, records: &[EffectivenessRecord], threshold: f64) -> Transitions {
        let mut transitions = Transitions::default();

        for record in records {
            let ok = record.effectiveness > threshold;
            if ok == self.committed_ok(record.index) {
                continue;
            }

            if ok {
                transitions.to_ok.push(record.index);
            } else {
                transitions.to_ko.push(record.index);
                transitions.worst = Some(match transitions.worst {
                    Some(worst) => worst.min(record.effectiveness),
                    None => record.effectiveness,
                });
            }
        }

        transitions
    }
}
